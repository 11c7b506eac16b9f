use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use validator::Validate;

use crate::domain::aggregates::User;
use crate::http::{extract::ValidJson, AppState};
use crate::services::{IssuedToken, Registration};
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(length(min = 1, max = 150, message = "must be 1 to 150 characters"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(length(min = 1, message = "is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

pub async fn register(State(s): State<AppState>, ValidJson(body): ValidJson<RegisterBody>) -> Result<(StatusCode, Json<User>)> {
    let registration = Registration { username: body.username, email: body.email, password: body.password };
    let user = s.services.accounts.register(registration).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(State(s): State<AppState>, ValidJson(body): ValidJson<LoginBody>) -> Result<Json<IssuedToken>> {
    Ok(Json(s.services.accounts.login(&body.username, &body.password).await?))
}
