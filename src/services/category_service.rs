use std::collections::HashMap;

use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use validator::Validate;

use crate::{
    dto::categories::{CategoryNode, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest},
    entity::categories::{ActiveModel, Column, Entity as Categories, Model as CategoryModel},
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, policy::Action},
    models::Category,
    response::ApiResponse,
    state::AppState,
};

/// Categories nest one level deep: a parent must itself be top-level.
pub async fn category_tree(state: &AppState) -> AppResult<ApiResponse<CategoryTree>> {
    let all = Categories::find()
        .order_by_asc(Column::Name)
        .order_by_asc(Column::Id)
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::ok("Categories", build_tree(all)))
}

pub fn build_tree(categories: Vec<CategoryModel>) -> CategoryTree {
    let mut children: HashMap<i64, Vec<Category>> = HashMap::new();
    let mut roots = Vec::new();
    for category in categories {
        match category.parent_id {
            Some(parent) => children.entry(parent).or_default().push(category.into()),
            None => roots.push(category),
        }
    }

    let items = roots
        .into_iter()
        .map(|root| {
            let kids = children.remove(&root.id).unwrap_or_default();
            CategoryNode::new(root.into(), kids)
        })
        .collect();
    CategoryTree { items }
}

pub async fn get_category(state: &AppState, id: i64) -> AppResult<ApiResponse<CategoryNode>> {
    let category = find_category(&state.orm, id).await?;
    let children = Categories::find()
        .filter(Column::ParentId.eq(id))
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::ok(
        "Category",
        CategoryNode::new(category.into(), children),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    user.require(Action::ManageCatalog)?;
    payload.validate()?;
    if let Some(parent_id) = payload.parent_id {
        ensure_valid_parent(&state.orm, None, parent_id).await?;
    }

    let category = ActiveModel {
        id: NotSet,
        name: Set(payload.name.trim().to_string()),
        parent_id: Set(payload.parent_id),
        image_url: Set(payload.image_url),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(category_id = category.id, by = user.user_id, "category created");
    Ok(ApiResponse::ok("Category created", category.into()))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    user.require(Action::ManageCatalog)?;
    payload.validate()?;
    let existing = find_category(&state.orm, id).await?;

    if payload.detach_parent && payload.parent_id.is_some() {
        return Err(AppError::BadRequest(
            "parent_id and detach_parent are mutually exclusive".into(),
        ));
    }
    if let Some(parent_id) = payload.parent_id {
        ensure_valid_parent(&state.orm, Some(id), parent_id).await?;
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if payload.detach_parent {
        active.parent_id = Set(None);
    } else if let Some(parent_id) = payload.parent_id {
        active.parent_id = Set(Some(parent_id));
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }

    let category = active.update(&state.orm).await?;
    Ok(ApiResponse::ok("Category updated", category.into()))
}

/// Children are promoted to top level and products lose their category.
pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    user.require(Action::ManageCatalog)?;
    let result = Categories::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("Category not found"));
    }

    tracing::info!(category_id = id, by = user.user_id, "category deleted");
    Ok(ApiResponse::ok("Category deleted", serde_json::json!({ "id": id })))
}

async fn find_category<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<CategoryModel> {
    Categories::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Category not found"))
}

async fn ensure_valid_parent<C: ConnectionTrait>(
    conn: &C,
    category_id: Option<i64>,
    parent_id: i64,
) -> AppResult<()> {
    if category_id == Some(parent_id) {
        return Err(AppError::BadRequest("A category cannot be its own parent".into()));
    }

    let parent = Categories::find_by_id(parent_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("Parent category {} does not exist", parent_id)))?;
    if parent.parent_id.is_some() {
        return Err(AppError::BadRequest(
            "Parent category must be a top-level category".into(),
        ));
    }

    if let Some(id) = category_id {
        let has_children = Categories::find()
            .filter(Column::ParentId.eq(id))
            .count(conn)
            .await?
            > 0;
        if has_children {
            return Err(AppError::BadRequest(
                "A category with subcategories cannot be nested".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn category(id: i64, name: &str, parent_id: Option<i64>) -> CategoryModel {
        CategoryModel {
            id,
            name: name.into(),
            parent_id,
            image_url: None,
            created_at: Utc::now().with_timezone(&FixedOffset::east_opt(0).expect("utc offset")),
        }
    }

    #[test]
    fn tree_groups_children_under_their_parent() {
        let tree = build_tree(vec![
            category(1, "Apparel", None),
            category(2, "Shirts", Some(1)),
            category(3, "Books", None),
            category(4, "Hats", Some(1)),
        ]);

        assert_eq!(tree.items.len(), 2);
        assert_eq!(tree.items[0].name, "Apparel");
        let kids: Vec<&str> = tree.items[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(kids, vec!["Shirts", "Hats"]);
        assert!(tree.items[1].children.is_empty());
    }

    #[test]
    fn orphaned_children_are_dropped_from_the_tree() {
        let tree = build_tree(vec![category(2, "Shirts", Some(99))]);
        assert!(tree.items.is_empty());
    }
}
