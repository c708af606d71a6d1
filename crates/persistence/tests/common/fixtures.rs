//! Test fixtures for data-access layer testing.
//!
//! This module provides the orders table and predefined orders for use in
//! tests, along with a builder for creating custom test data.

use serde_json::{Value, json};

use helios_dal::types::{KeySchema, Record, SecondaryIndexDescriptor, TableDescriptor};

/// Name of the fixture table.
pub const ORDERS: &str = "orders";

/// The fixture table.
///
/// | Index | Partition | Sort |
/// |-------|-----------|------|
/// | `byStatus` | `status` | `createdAt` |
/// | `byTenant` | `tenantId` | `createdAt` |
/// | `byCustomer` | `customerId` | - |
pub fn orders_table() -> TableDescriptor {
    TableDescriptor::new(ORDERS, KeySchema::partition("id"), "tenantId")
        .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"))
        .with_index(SecondaryIndexDescriptor::new("byTenant", "tenantId").with_sort_key("createdAt"))
        .with_index(SecondaryIndexDescriptor::new("byCustomer", "customerId"))
}

/// An order fixture.
#[derive(Debug, Clone)]
pub struct OrderFixture {
    /// Order ID.
    pub id: String,
    /// Owning tenant.
    pub tenant: String,
    /// Order status.
    pub status: String,
    /// Creation timestamp, the sort key of most indexes.
    pub created_at: String,
    /// Customer the order belongs to.
    pub customer_id: String,
    /// Order amount.
    pub amount: Option<i64>,
    /// Free-text note.
    pub note: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Shipping city, stored under `shipping.city`.
    pub city: Option<String>,
    /// Line item SKUs, stored as `items[n].sku`.
    pub skus: Vec<String>,
}

impl OrderFixture {
    /// Creates an open order of customer `c-1` with minimal fields.
    pub fn new(id: impl Into<String>, tenant: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            status: "open".to_string(),
            created_at: created_at.into(),
            customer_id: "c-1".to_string(),
            amount: None,
            note: None,
            tags: vec![],
            city: None,
            skus: vec![],
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Sets the customer.
    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = customer_id.into();
        self
    }

    /// Sets the amount.
    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets the note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Sets the tags.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Sets the shipping city.
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Sets the line item SKUs.
    pub fn with_skus(mut self, skus: &[&str]) -> Self {
        self.skus = skus.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Converts the fixture to a stored record.
    pub fn to_record(&self) -> Record {
        let mut record = json!({
            "id": self.id,
            "tenantId": self.tenant,
            "status": self.status,
            "createdAt": self.created_at,
            "customerId": self.customer_id,
        });
        let map = record.as_object_mut().unwrap();
        if let Some(amount) = self.amount {
            map.insert("amount".into(), json!(amount));
        }
        if let Some(note) = &self.note {
            map.insert("note".into(), json!(note));
        }
        if !self.tags.is_empty() {
            map.insert("tags".into(), json!(self.tags));
        }
        if let Some(city) = &self.city {
            map.insert("shipping".into(), json!({"city": city}));
        }
        if !self.skus.is_empty() {
            let items: Vec<Value> = self.skus.iter().map(|sku| json!({"sku": sku})).collect();
            map.insert("items".into(), Value::Array(items));
        }
        map.clone()
    }
}

/// A varied set of orders across two tenants.
///
/// Tenant `acme` owns `a-01`..`a-10`; tenant `globex` owns `g-01`..`g-04`.
pub fn standard_orders() -> Vec<OrderFixture> {
    vec![
        OrderFixture::new("a-01", "acme", "2024-01-01")
            .with_amount(50)
            .with_note("Leave at the Door")
            .with_tags(&["red"])
            .with_city("Oslo")
            .with_skus(&["A", "B"]),
        OrderFixture::new("a-02", "acme", "2024-01-02")
            .with_amount(100)
            .with_tags(&["blue", "green"])
            .with_city("Bergen"),
        OrderFixture::new("a-03", "acme", "2024-01-03")
            .with_amount(250)
            .with_note("fragile: glass")
            .with_skus(&["B"]),
        OrderFixture::new("a-04", "acme", "2024-01-04")
            .with_amount(500)
            .with_status("closed")
            .with_tags(&["red", "blue"]),
        OrderFixture::new("a-05", "acme", "2024-01-05")
            .with_amount(501)
            .with_city("Oslo")
            .with_customer("c-2"),
        OrderFixture::new("a-06", "acme", "2024-01-06")
            .with_note("call first")
            .with_customer("c-2"),
        OrderFixture::new("a-07", "acme", "2024-01-07")
            .with_amount(99)
            .with_status("closed")
            .with_skus(&["C", "A"]),
        OrderFixture::new("a-08", "acme", "2024-01-08")
            .with_amount(300)
            .with_tags(&["green"])
            .with_city("Trondheim"),
        OrderFixture::new("a-09", "acme", "2024-01-09")
            .with_amount(400)
            .with_note("door code 1234"),
        OrderFixture::new("a-10", "acme", "2024-01-10")
            .with_amount(120)
            .with_status("cancelled")
            .with_city("oslo"),
        OrderFixture::new("g-01", "globex", "2024-01-01").with_amount(150),
        OrderFixture::new("g-02", "globex", "2024-01-02")
            .with_amount(300)
            .with_tags(&["red"]),
        OrderFixture::new("g-03", "globex", "2024-01-03")
            .with_amount(450)
            .with_status("closed"),
        OrderFixture::new("g-04", "globex", "2024-01-04").with_city("Oslo"),
    ]
}

/// `count` open orders of one tenant, with ascending timestamps and amounts.
pub fn numbered_orders(tenant: &str, count: usize) -> Vec<OrderFixture> {
    (0..count)
        .map(|i| {
            OrderFixture::new(format!("{}-{:03}", tenant, i), tenant, format!("2024-{:04}", i))
                .with_amount(i as i64)
        })
        .collect()
}
