//! Simulated reference data: products and customers
//!
//! The catalog is built once at startup. Product stock is the only field the
//! simulator mutates afterwards.

use crate::simulator::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};

/// A product for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID (e.g., "p1001")
    pub id: String,
    /// Display name
    pub name: String,
    /// Merchandising category
    pub category: String,
    /// Unit price in dollars
    pub price: f64,
    /// Units on hand
    pub stock: u32,
}

impl Product {
    fn new(id: &str, name: &str, category: &str, price: f64, stock: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price,
            stock,
        }
    }
}

/// A known customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID (e.g., "c101")
    pub id: String,
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
}

impl Customer {
    fn new(id: &str, name: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}

/// Products and customers the simulator draws from.
///
/// Both collections are guaranteed non-empty.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
    customers: Vec<Customer>,
}

impl Catalog {
    /// Build a catalog, rejecting empty collections.
    pub fn new(products: Vec<Product>, customers: Vec<Customer>) -> SimulationResult<Self> {
        if products.is_empty() {
            return Err(SimulationError::EmptyCatalog("products"));
        }
        if customers.is_empty() {
            return Err(SimulationError::EmptyCatalog("customers"));
        }
        Ok(Self {
            products,
            customers,
        })
    }

    /// The demo store's starting inventory and customer list.
    pub fn seeded() -> Self {
        Self {
            products: vec![
                Product::new("p1001", "Smartphone", "electronics", 699.99, 50),
                Product::new("p1002", "Laptop", "electronics", 1299.99, 25),
                Product::new("p1003", "Headphones", "electronics", 149.99, 100),
                Product::new("p1004", "Running Shoes", "sports", 89.99, 75),
                Product::new("p1005", "Coffee Maker", "home", 79.99, 30),
            ],
            customers: vec![
                Customer::new("c101", "Alice Johnson", "alice@example.com"),
                Customer::new("c102", "Bob Smith", "bob@example.com"),
                Customer::new("c103", "Carol Williams", "carol@example.com"),
                Customer::new("c104", "David Brown", "david@example.com"),
            ],
        }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    /// Look up a product by ID.
    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    /// Look up a customer by ID.
    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|customer| customer.id == id)
    }

    pub(crate) fn product_mut(&mut self, id: &str) -> Option<&mut Product> {
        self.products.iter_mut().find(|product| product.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_catalog() {
        let catalog = Catalog::seeded();
        assert_eq!(catalog.products().len(), 5);
        assert_eq!(catalog.customers().len(), 4);
        assert_eq!(catalog.product("p1001").unwrap().stock, 50);
        assert_eq!(catalog.customer("c102").unwrap().name, "Bob Smith");
        assert!(catalog.product("p9999").is_none());
    }

    #[test]
    fn test_empty_collections_rejected() {
        let seeded = Catalog::seeded();

        let err = Catalog::new(Vec::new(), seeded.customers().to_vec()).unwrap_err();
        assert!(matches!(err, SimulationError::EmptyCatalog("products")));

        let err = Catalog::new(seeded.products().to_vec(), Vec::new()).unwrap_err();
        assert!(matches!(err, SimulationError::EmptyCatalog("customers")));
    }
}
