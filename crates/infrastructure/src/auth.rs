//! JWT 认证适配器
//!
//! 将连接携带的 HS256 令牌解析为已验证身份。令牌由账号体系签发，
//! 这里只做验证，不做签发（`generate_token` 仅供测试和开发工具使用）。

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use application::ports::{AuthError, Authenticator};
use config::JwtConfig;
use domain::{UserId, UserIdentity};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 id
    pub sub: Uuid,
    pub username: String,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

pub struct JwtAuthenticator {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtAuthenticator {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token（测试 / 开发工具）
    pub fn generate_token(&self, user_id: Uuid, username: &str) -> Result<String, AuthError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: exp.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let data =
            decode::<Claims>(token, &self.decoding_key, &Validation::default()).map_err(|err| {
                debug!(%err, "token verification failed");
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                    _ => AuthError::InvalidToken,
                }
            })?;
        Ok(UserIdentity {
            user_id: UserId::new(data.claims.sub),
            username: data.claims.username,
        })
    }
}
