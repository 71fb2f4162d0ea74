use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::Category;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100), custom(function = "super::not_blank"))]
    pub name: String,
    pub parent_id: Option<i64>,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// `parent_id: null` is not distinguishable from an absent field, so detaching
/// a category from its parent uses `detach_parent`.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 100), custom(function = "super::not_blank"))]
    pub name: Option<String>,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub detach_parent: bool,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// A top-level category with its direct children.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryNode {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub children: Vec<Category>,
}

impl CategoryNode {
    pub fn new(category: Category, children: Vec<Category>) -> Self {
        Self {
            id: category.id,
            name: category.name,
            parent_id: category.parent_id,
            image_url: category.image_url,
            created_at: category.created_at,
            children,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryTree {
    #[schema(value_type = Vec<CategoryNode>)]
    pub items: Vec<CategoryNode>,
}
