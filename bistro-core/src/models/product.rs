//! Catalog products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Menu section a product is listed under.
///
/// The four built-in sections cover the usual menu; any other tag found in
/// the sheet is kept verbatim in `Other` so it survives a round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Category {
    Starters,
    #[default]
    MainCourses,
    Desserts,
    Drinks,
    Other(String),
}

impl Category {
    /// Tag stored in the sheet's category column.
    pub fn tag(&self) -> &str {
        match self {
            Category::Starters => "starters",
            Category::MainCourses => "main-courses",
            Category::Desserts => "desserts",
            Category::Drinks => "drinks",
            Category::Other(tag) => tag,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        match self {
            Category::Starters => "Starters",
            Category::MainCourses => "Main Courses",
            Category::Desserts => "Desserts",
            Category::Drinks => "Drinks",
            Category::Other(tag) => tag,
        }
    }

    /// Maps a sheet tag to a category. Never fails: unknown tags become `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "starters" => Category::Starters,
            "main-courses" => Category::MainCourses,
            "desserts" => Category::Desserts,
            "drinks" => Category::Drinks,
            _ => Category::Other(tag.trim().to_string()),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("Category cannot be empty".to_string());
        }
        Ok(Category::from_tag(s))
    }
}

impl From<String> for Category {
    fn from(tag: String) -> Self {
        Category::from_tag(&tag)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.tag().to_string()
    }
}

/// Whether a product is currently offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

impl ProductStatus {
    /// The opposite status.
    pub fn toggled(self) -> Self {
        match self {
            ProductStatus::Active => ProductStatus::Inactive,
            ProductStatus::Inactive => ProductStatus::Active,
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductStatus::Active => write!(f, "active"),
            ProductStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            _ => Err(format!(
                "Invalid product status '{}'. Valid options: active, inactive",
                s
            )),
        }
    }
}

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Category,
    pub price: Decimal,
    pub status: ProductStatus,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        writeln!(f, "ID:       {}", self.id)?;
        writeln!(f, "Category: {}", self.category.label())?;
        writeln!(f, "Price:    {:.2}", self.price)?;
        writeln!(f, "Status:   {}", self.status)?;
        if let Some(description) = &self.description {
            writeln!(f, "\n{}", description)?;
        }
        Ok(())
    }
}

/// Fields supplied by the user when adding a product.
///
/// The id and creation timestamp are assigned when the product is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub category: Category,
    pub price: Decimal,
    pub status: ProductStatus,
    pub description: Option<String>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            category: Category::default(),
            price,
            status: ProductStatus::Active,
            description: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    /// Checks the fields the catalog requires.
    pub fn validate(&self) -> Result<(), String> {
        validate_fields(&self.name, self.price)
    }

    pub(crate) fn into_product(self, id: i64, created_at: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name.trim().to_string(),
            category: self.category,
            price: self.price,
            status: self.status,
            description: self.description,
            created_at: Some(created_at),
        }
    }
}

pub(crate) fn validate_fields(name: &str, price: Decimal) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is required".to_string());
    }
    if price < Decimal::ZERO {
        return Err(format!("price must not be negative (got {})", price));
    }
    Ok(())
}
