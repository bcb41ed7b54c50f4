use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub ui_origin: String,

    /// Extra allowed CORS origins (e.g. LAN addresses while testing from
    /// another device), comma-separated in the environment.
    pub cors_extra_origins: Vec<String>,

    /// HS256 signing secret shared with the identity provider.
    pub auth_jwt_secret: String,

    pub gemini_api_key: String,
    pub gemini_model: String,

    pub paystack_secret_key: String,

    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .expect("PORT must be a number"),
            ui_origin: env::var("UI_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_extra_origins: parse_origin_list(
                &env::var("CORS_EXTRA_ORIGINS").unwrap_or_default(),
            ),

            auth_jwt_secret: env::var("AUTH_JWT_SECRET").expect("AUTH_JWT_SECRET must be set"),

            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_else(|_| String::new()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-lite".into()),

            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY").unwrap_or_else(|_| String::new()),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (5 * 1024 * 1024).to_string())
                .parse()
                .expect("MAX_UPLOAD_BYTES must be a number"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_list_splits_trims_and_skips_empties() {
        assert_eq!(
            parse_origin_list("http://192.168.0.4:3000, http://localhost:5173 ,,"),
            vec![
                "http://192.168.0.4:3000".to_string(),
                "http://localhost:5173".to_string(),
            ]
        );
        assert!(parse_origin_list("").is_empty());
    }
}
