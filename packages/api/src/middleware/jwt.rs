use crate::{
    entity::{pos_terminal, prelude::*},
    error::ApiError,
    state::{AppState, CachedTerminal, TokenRole},
};
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use hyper::header::AUTHORIZATION;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

#[derive(Debug, Clone)]
pub struct CustomerUser {
    pub sub: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShopOwnerUser {
    pub sub: String,
    pub shops: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TerminalUser {
    pub terminal_id: String,
    pub shop_id: String,
}

#[derive(Debug, Clone)]
pub enum AppUser {
    Customer(CustomerUser),
    ShopOwner(ShopOwnerUser),
    Terminal(TerminalUser),
    Unauthorized,
}

impl AppUser {
    pub fn customer(&self) -> Result<&CustomerUser, ApiError> {
        match self {
            AppUser::Customer(user) => Ok(user),
            AppUser::Unauthorized => Err(ApiError::UNAUTHORIZED),
            _ => Err(ApiError::forbidden("Customer token required")),
        }
    }

    pub fn terminal(&self) -> Result<&TerminalUser, ApiError> {
        match self {
            AppUser::Terminal(terminal) => Ok(terminal),
            AppUser::Unauthorized => Err(ApiError::UNAUTHORIZED),
            _ => Err(ApiError::forbidden("POS terminal key required")),
        }
    }

    /// Passes when the caller owns `shop_id`. Returns the owner's sub.
    pub fn require_shop_owner(&self, shop_id: &str) -> Result<&str, ApiError> {
        match self {
            AppUser::ShopOwner(owner) if owner.shops.iter().any(|s| s == shop_id) => {
                Ok(&owner.sub)
            }
            AppUser::Unauthorized => Err(ApiError::UNAUTHORIZED),
            _ => Err(ApiError::FORBIDDEN),
        }
    }

    /// Identifier for logs and error reports
    pub fn actor(&self) -> Option<String> {
        match self {
            AppUser::Customer(user) => Some(user.sub.clone()),
            AppUser::ShopOwner(user) => Some(user.sub.clone()),
            AppUser::Terminal(terminal) => Some(terminal.terminal_id.clone()),
            AppUser::Unauthorized => None,
        }
    }
}

/// Splits `pos_<terminal_id>.<secret>`.
pub fn parse_api_key(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.trim().strip_prefix("pos_")?;
    let (terminal_id, secret) = rest.split_once('.')?;
    if terminal_id.is_empty() || secret.is_empty() || secret.contains('.') {
        return None;
    }
    Some((terminal_id, secret))
}

/// Hex digest stored in `PosTerminal.keyHash`
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_hex().to_string().to_lowercase()
}

/// Key of the terminal cache. Never the raw key.
pub fn terminal_cache_key(terminal_id: &str, secret_hash: &str) -> String {
    format!("{}:{}", terminal_id, secret_hash)
}

async fn resolve_terminal(
    state: &AppState,
    terminal_id: &str,
    secret: &str,
) -> Result<Option<CachedTerminal>, ApiError> {
    let secret_hash = hash_secret(secret);
    let cache_key = terminal_cache_key(terminal_id, &secret_hash);
    if let Some(cached) = state.terminal_cache.get(&cache_key) {
        return Ok(Some(cached));
    }

    let db_terminal = PosTerminal::find()
        .filter(
            pos_terminal::Column::Id
                .eq(terminal_id)
                .and(pos_terminal::Column::KeyHash.eq(secret_hash)),
        )
        .one(&state.db)
        .await?;

    let Some(terminal) = db_terminal else {
        return Ok(None);
    };
    let cached = CachedTerminal {
        terminal_id: terminal.id,
        shop_id: terminal.shop_id,
        valid_until: terminal.valid_until,
    };
    state.terminal_cache.insert(cache_key, cached.clone());
    Ok(Some(cached))
}

pub async fn jwt_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response<Body>, ApiError> {
    let mut request = request;
    if let Some(auth_header) = request.headers().get(AUTHORIZATION)
        && let Ok(token) = auth_header.to_str()
    {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        let claims = state
            .validate_token(token)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token: {e}")))?;
        let user = match claims.role {
            TokenRole::Customer => AppUser::Customer(CustomerUser {
                sub: claims.sub,
                email: claims.email,
                phone: claims.phone,
            }),
            TokenRole::ShopOwner => AppUser::ShopOwner(ShopOwnerUser {
                sub: claims.sub,
                shops: claims.shops,
            }),
        };
        request.extensions_mut().insert::<AppUser>(user);
        return Ok(next.run(request).await);
    }

    if let Some(api_key_header) = request.headers().get("x-api-key")
        && let Ok(api_key_str) = api_key_header.to_str()
    {
        let Some((terminal_id, secret)) = parse_api_key(api_key_str) else {
            metrics::counter!("api_key_rejections_total", "reason" => "format").increment(1);
            return Err(ApiError::unauthorized("Invalid API key format"));
        };

        if let Some(terminal) = resolve_terminal(&state, terminal_id, secret).await? {
            if let Some(valid_until) = terminal.valid_until {
                let now = chrono::Utc::now().naive_utc();
                if valid_until < now {
                    metrics::counter!("api_key_rejections_total", "reason" => "expired")
                        .increment(1);
                    return Err(ApiError::unauthorized("API key is expired"));
                }
            }

            let user = AppUser::Terminal(TerminalUser {
                terminal_id: terminal.terminal_id,
                shop_id: terminal.shop_id,
            });
            request.extensions_mut().insert::<AppUser>(user);
            return Ok(next.run(request).await);
        }
    }

    request
        .extensions_mut()
        .insert::<AppUser>(AppUser::Unauthorized);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_parse_api_key() {
        assert_eq!(
            parse_api_key("pos_term1.s3cr3t"),
            Some(("term1", "s3cr3t"))
        );
        assert_eq!(
            parse_api_key(" pos_term1.s3cr3t \n"),
            Some(("term1", "s3cr3t"))
        );
        assert_eq!(parse_api_key("pat_term1.s3cr3t"), None);
        assert_eq!(parse_api_key("pos_term1"), None);
        assert_eq!(parse_api_key("pos_.s3cr3t"), None);
        assert_eq!(parse_api_key("pos_term1."), None);
        assert_eq!(parse_api_key("pos_a.b.c"), None);
    }

    #[test]
    fn test_hash_secret_is_stable_hex() {
        let hash = hash_secret("s3cr3t");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_secret("s3cr3t"));
        assert_ne!(hash, hash_secret("s3cr3T"));
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_guards() {
        let owner = AppUser::ShopOwner(ShopOwnerUser {
            sub: "owner_1".into(),
            shops: vec!["shop_cafe".into()],
        });
        assert_eq!(owner.require_shop_owner("shop_cafe").unwrap(), "owner_1");
        assert_eq!(
            owner.require_shop_owner("shop_bakery").unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            owner.customer().unwrap_err().status(),
            StatusCode::FORBIDDEN
        );

        let anonymous = AppUser::Unauthorized;
        assert_eq!(
            anonymous.terminal().unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(anonymous.actor(), None);

        let terminal = AppUser::Terminal(TerminalUser {
            terminal_id: "term1".into(),
            shop_id: "shop_cafe".into(),
        });
        assert_eq!(terminal.terminal().unwrap().shop_id, "shop_cafe");
        assert_eq!(terminal.actor().as_deref(), Some("term1"));
    }
}
