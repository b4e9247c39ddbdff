//! Owner accounts: signup, login and the business profile

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Business, BusinessUpdate, DEFAULT_ACCENT_COLOR, is_valid_accent_color, is_valid_slug, slugify,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::OwnerContext;
use crate::auth::owner_auth::create_token;
use crate::error::ServiceResult;
use crate::store::{Owner, Store, StoreError};
use crate::util::{hash_password, non_blank, normalize_email, verify_password};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_BUSINESS_NAME_LEN: usize = 80;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub business_name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token issued on signup and login
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub owner_id: i64,
    pub business_id: i64,
    pub slug: String,
}

fn business_name(value: &str) -> Result<String, AppError> {
    let name = value.trim();
    if name.is_empty() {
        return Err(AppError::validation("Business name is required").with_detail("field", "business_name"));
    }
    if name.chars().count() > MAX_BUSINESS_NAME_LEN {
        return Err(AppError::validation(format!(
            "Business name must be at most {MAX_BUSINESS_NAME_LEN} characters"
        ))
        .with_detail("field", "business_name"));
    }
    Ok(name.to_string())
}

fn accent_color(value: &str) -> Result<String, AppError> {
    let color = value.trim().to_lowercase();
    if !is_valid_accent_color(&color) {
        return Err(AppError::validation("Accent color must be #rrggbb")
            .with_detail("field", "accent_color"));
    }
    Ok(color)
}

/// Explicit slug must already be well-formed; a derived one must come out well-formed
fn resolve_slug(explicit: Option<String>, name: &str) -> Result<String, AppError> {
    let slug = match non_blank(explicit) {
        Some(slug) => slug.to_lowercase(),
        None => slugify(name),
    };
    if !is_valid_slug(&slug) {
        return Err(AppError::new(ErrorCode::SlugInvalid).with_detail("slug", slug));
    }
    Ok(slug)
}

fn issue_token(owner: &Owner, business: &Business, secret: &str) -> Result<AuthResponse, AppError> {
    let token = create_token(owner.id, &owner.email, secret).map_err(|e| {
        tracing::error!("JWT creation failed: {e}");
        AppError::new(ErrorCode::InternalError)
    })?;
    Ok(AuthResponse {
        token,
        owner_id: owner.id,
        business_id: business.id,
        slug: business.slug.clone(),
    })
}

/// Create an owner account together with its business
pub async fn signup(
    store: &dyn Store,
    jwt_secret: &str,
    req: SignupRequest,
) -> ServiceResult<AuthResponse> {
    let email = normalize_email(&req.email);
    if !email.contains('@') || email.len() < 3 {
        return Err(AppError::validation("Invalid email address").with_detail("field", "email").into());
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::new(ErrorCode::PasswordTooShort).into());
    }
    let name = business_name(&req.business_name)?;
    let slug = resolve_slug(req.slug, &name)?;
    let accent_color = match req.accent_color.as_deref() {
        Some(color) => accent_color(color)?,
        None => DEFAULT_ACCENT_COLOR.to_string(),
    };

    let hashed_password = hash_password(&req.password).map_err(|e| {
        tracing::error!("Password hashing failed: {e}");
        AppError::new(ErrorCode::InternalError)
    })?;

    let now = now_millis();
    let owner = Owner {
        id: snowflake_id(),
        email,
        hashed_password,
        created_at: now,
    };
    let business = Business {
        id: snowflake_id(),
        owner_id: owner.id,
        name,
        description: None,
        logo_url: None,
        slug,
        accent_color,
        created_at: now,
    };

    match store.create_owner(&owner, &business).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(field)) if field == "email" => {
            return Err(AppError::new(ErrorCode::EmailTaken).into());
        }
        Err(StoreError::Duplicate(field)) if field == "slug" => {
            return Err(AppError::new(ErrorCode::SlugTaken)
                .with_detail("slug", business.slug.clone())
                .into());
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        owner_id = owner.id,
        business_id = business.id,
        slug = %business.slug,
        "Owner signed up"
    );
    Ok(issue_token(&owner, &business, jwt_secret)?)
}

pub async fn login(
    store: &dyn Store,
    jwt_secret: &str,
    req: LoginRequest,
) -> ServiceResult<AuthResponse> {
    let email = normalize_email(&req.email);
    let owner = store
        .owner_by_email(&email)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    if !verify_password(&req.password, &owner.hashed_password) {
        return Err(AppError::invalid_credentials().into());
    }

    let business = store
        .business_by_owner(owner.id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;

    tracing::info!(owner_id = owner.id, business_id = business.id, "Owner logged in");
    Ok(issue_token(&owner, &business, jwt_secret)?)
}

pub async fn get_business(store: &dyn Store, owner: &OwnerContext) -> ServiceResult<Business> {
    store
        .business_by_id(owner.business_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound).into())
}

/// Update profile fields; the slug stays as created
pub async fn update_business(
    store: &dyn Store,
    owner: &OwnerContext,
    update: BusinessUpdate,
) -> ServiceResult<Business> {
    let update = BusinessUpdate {
        name: update.name.as_deref().map(business_name).transpose()?,
        description: update.description.map(|d| d.trim().to_string()),
        logo_url: update.logo_url.map(|u| u.trim().to_string()),
        accent_color: update.accent_color.as_deref().map(accent_color).transpose()?,
    };
    store
        .update_business(owner.business_id, &update)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::owner_auth::verify_token;
    use crate::store::MemoryStore;

    fn signup_req(email: &str, name: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            password: "hunter2hunter2".into(),
            business_name: name.into(),
            slug: None,
            accent_color: None,
        }
    }

    #[tokio::test]
    async fn signup_then_login() {
        let store = MemoryStore::new();
        let created = signup(&store, "secret", signup_req(" Owner@Example.com", "Corner Café"))
            .await
            .unwrap();
        assert_eq!(created.slug, "corner-caf");
        assert_eq!(verify_token(&created.token, "secret").unwrap().sub, created.owner_id);

        let business = store.business_by_id(created.business_id).await.unwrap().unwrap();
        assert_eq!(business.accent_color, DEFAULT_ACCENT_COLOR);

        let logged_in = login(
            &store,
            "secret",
            LoginRequest {
                email: "owner@example.com".into(),
                password: "hunter2hunter2".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(logged_in.business_id, created.business_id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let store = MemoryStore::new();
        signup(&store, "secret", signup_req("owner@example.com", "Cafe One"))
            .await
            .unwrap();
        for (email, password) in [
            ("owner@example.com", "wrong-password"),
            ("nobody@example.com", "hunter2hunter2"),
        ] {
            let err = login(
                &store,
                "secret",
                LoginRequest {
                    email: email.into(),
                    password: password.into(),
                },
            )
            .await
            .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidCredentials);
        }
    }

    #[tokio::test]
    async fn duplicate_email_and_slug() {
        let store = MemoryStore::new();
        signup(&store, "secret", signup_req("a@example.com", "Cafe One"))
            .await
            .unwrap();

        let err = signup(&store, "secret", signup_req("A@example.com", "Other Place"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmailTaken);

        let err = signup(&store, "secret", signup_req("b@example.com", "Cafe  One!"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SlugTaken);
    }

    #[tokio::test]
    async fn signup_validation() {
        let store = MemoryStore::new();

        let mut short = signup_req("a@example.com", "Cafe One");
        short.password = "short".into();
        assert_eq!(
            signup(&store, "secret", short).await.unwrap_err().code(),
            ErrorCode::PasswordTooShort
        );

        let mut bad_slug = signup_req("a@example.com", "Cafe One");
        bad_slug.slug = Some("-nope".into());
        assert_eq!(
            signup(&store, "secret", bad_slug).await.unwrap_err().code(),
            ErrorCode::SlugInvalid
        );

        // Nothing slug-worthy in the name
        assert_eq!(
            signup(&store, "secret", signup_req("a@example.com", "☕☕"))
                .await
                .unwrap_err()
                .code(),
            ErrorCode::SlugInvalid
        );

        let mut bad_color = signup_req("a@example.com", "Cafe One");
        bad_color.accent_color = Some("orange".into());
        assert_eq!(
            signup(&store, "secret", bad_color).await.unwrap_err().code(),
            ErrorCode::ValidationFailed
        );
    }

    #[tokio::test]
    async fn update_keeps_slug() {
        let store = MemoryStore::new();
        let created = signup(&store, "secret", signup_req("a@example.com", "Cafe One"))
            .await
            .unwrap();
        let owner = OwnerContext {
            owner_id: created.owner_id,
            business_id: created.business_id,
        };
        let updated = update_business(
            &store,
            &owner,
            BusinessUpdate {
                name: Some(" Cafe Two ".into()),
                accent_color: Some("#00AAFF".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Cafe Two");
        assert_eq!(updated.accent_color, "#00aaff");
        assert_eq!(updated.slug, "cafe-one");
        assert_eq!(get_business(&store, &owner).await.unwrap(), updated);
    }
}
