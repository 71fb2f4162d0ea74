use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entity::sea_orm_active_enums::{UserRole, UserStatus},
    models::{Employee, User},
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateEmployeeRequest {
    #[validate(length(min = 3, max = 50), custom(function = "super::not_blank"))]
    pub username: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: UserRole,
    #[validate(length(min = 1, max = 100), custom(function = "super::not_blank"))]
    pub name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub position: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 1, max = 100), custom(function = "super::not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub position: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeDetail {
    pub user: User,
    pub employee: Option<Employee>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct EmployeeList {
    #[schema(value_type = Vec<EmployeeDetail>)]
    pub items: Vec<EmployeeDetail>,
}
