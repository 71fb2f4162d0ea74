use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use validator::Validate;

use crate::{
    dto::products::{CreateProductRequest, ProductList, StockAdjustRequest, UpdateProductRequest},
    entity::{
        categories::{Column as CatCol, Entity as Categories},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, policy::Action},
    models::Product,
    response::ApiResponse,
    routes::params::{ProductQuery, ProductSortBy, SortOrder, search_term},
    state::AppState,
    storage::UploadedFile,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let page = query.page();
    let mut condition = Condition::all();

    if let Some(search) = search_term(query.q.as_ref()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        // A top-level category also lists the products of its children.
        let mut ids: Vec<i64> = Categories::find()
            .select_only()
            .column(CatCol::Id)
            .filter(CatCol::ParentId.eq(category_id))
            .into_tuple()
            .all(&state.orm)
            .await?;
        ids.push(category_id);
        condition = condition.add(Column::CategoryId.is_in(ids));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }
    match query.in_stock {
        Some(true) => condition = condition.add(Column::StockQuantity.gt(0)),
        Some(false) => condition = condition.add(Column::StockQuantity.eq(0)),
        None => {}
    }

    let sort_col = match query.sort_by.unwrap_or_default() {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
        ProductSortBy::Stock => Column::StockQuantity,
    };

    let mut finder = Products::find().filter(condition);
    finder = match query.sort_order.unwrap_or_default() {
        SortOrder::Asc => finder.order_by_asc(sort_col).order_by_asc(Column::Id),
        SortOrder::Desc => finder.order_by_desc(sort_col).order_by_desc(Column::Id),
    };

    let total = finder.clone().count(&state.orm).await?;

    let items = finder
        .limit(page.limit())
        .offset(page.offset())
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::paged("Products", ProductList { items }, &page, total))
}

pub async fn get_product(state: &AppState, id: i64) -> AppResult<ApiResponse<Product>> {
    let product = find_product(&state.orm, id).await?;
    Ok(ApiResponse::ok("Product", product.into()))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    user.require(Action::ManageCatalog)?;
    payload.validate()?;
    if let Some(category_id) = payload.category_id {
        ensure_category(&state.orm, category_id).await?;
    }

    let product = ActiveModel {
        id: NotSet,
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        stock_quantity: Set(payload.stock_quantity),
        image_url: Set(payload.image_url),
        category_id: Set(payload.category_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(duplicate_name)?;

    tracing::info!(product_id = product.id, by = user.user_id, "product created");
    Ok(ApiResponse::ok("Product created", product.into()))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    user.require(Action::ManageCatalog)?;
    payload.validate()?;
    let existing = find_product(&state.orm, id).await?;
    if let Some(category_id) = payload.category_id {
        ensure_category(&state.orm, category_id).await?;
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock_quantity {
        active.stock_quantity = Set(stock);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(Some(category_id));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await.map_err(duplicate_name)?;
    Ok(ApiResponse::ok("Updated", product.into()))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    user.require(Action::ManageCatalog)?;
    find_product(&state.orm, id).await?;

    let referenced = OrderItems::find()
        .filter(OrderItemCol::ProductId.eq(id))
        .count(&state.orm)
        .await?;
    if referenced > 0 {
        return Err(AppError::Conflict(
            "Product is referenced by existing orders".into(),
        ));
    }

    Products::delete_by_id(id).exec(&state.orm).await?;
    tracing::info!(product_id = id, by = user.user_id, "product deleted");

    Ok(ApiResponse::ok("Deleted", serde_json::json!({ "id": id })))
}

/// Manual stock correction; the row is locked so it serializes with order placement.
pub async fn adjust_stock(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: StockAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    user.require(Action::ManageCatalog)?;

    let txn = state.orm.begin().await?;
    let existing = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    let new_stock = existing
        .stock_quantity
        .checked_add(payload.delta)
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Stock cannot go below zero (current: {}, delta: {})",
                existing.stock_quantity, payload.delta
            ))
        })?;

    let mut active: ActiveModel = existing.into();
    active.stock_quantity = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(product_id = id, delta = payload.delta, stock = new_stock, "stock adjusted");
    Ok(ApiResponse::ok("Stock updated", product.into()))
}

pub async fn upload_image(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    file: UploadedFile,
) -> AppResult<ApiResponse<Product>> {
    user.require(Action::ManageCatalog)?;
    if !file.is_image() {
        return Err(AppError::BadRequest("Product image must be an image".into()));
    }
    let existing = find_product(&state.orm, id).await?;

    let stored = state.storage.upload("products", file).await?;

    let mut active: ActiveModel = existing.into();
    active.image_url = Set(Some(stored.url));
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&state.orm).await?;

    Ok(ApiResponse::ok("Image uploaded", product.into()))
}

async fn find_product<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<()> {
    if Categories::find_by_id(id).one(conn).await?.is_none() {
        return Err(AppError::BadRequest(format!("Category {} does not exist", id)));
    }
    Ok(())
}

fn duplicate_name(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("A product with this name already exists".into())
        }
        _ => AppError::OrmError(err),
    }
}
