use serde::{Deserialize, Serialize};

use super::GeoPoint;

pub type ListingId = u64;
pub type UserId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub admin_area: String,
    pub country: String,
    pub coordinates: Option<GeoPoint>,
}

impl Location {
    /// "City, Area, Country" with empty parts left out.
    pub fn label(&self) -> String {
        [&self.city, &self.admin_area, &self.country]
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A classified listing as read from the relational store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    pub make: String,
    pub years: Vec<String>,
    pub models: Vec<String>,
    pub engines: Vec<String>,
    pub ad_category_id: i64,
    pub category: String,
    pub subcategory: String,
    pub price: f64,
    pub location: Option<Location>,
    pub rock_count: u32,
    pub has_embedding: bool,
}

impl Listing {
    pub fn new(id: ListingId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_vehicle(
        mut self,
        make: impl Into<String>,
        years: &[&str],
        models: &[&str],
        engines: &[&str],
    ) -> Self {
        self.make = make.into();
        self.years = years.iter().map(|s| s.to_string()).collect();
        self.models = models.iter().map(|s| s.to_string()).collect();
        self.engines = engines.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_category(
        mut self,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        self.category = category.into();
        self.subcategory = subcategory.into();
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_rock_count(mut self, rock_count: u32) -> Self {
        self.rock_count = rock_count;
        self
    }

    pub fn to_ref(&self) -> ListingRef {
        ListingRef {
            id: self.id,
            title: self.title.clone(),
        }
    }
}

/// Minimal listing reference carried on the listing queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRef {
    pub id: ListingId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentCompany {
    pub name: String,
    pub country: String,
}
