//! The Coupang Partners open-API client. The only operation the pipeline
//! needs is keyword search; the interesting part is the request signing:
//! every call carries a `CEA` authorization header whose signature is
//! HMAC-SHA256 over `datetime + method + path + query` (the body is never
//! signed), with the datetime in compact `yymmddTHHMMSSZ` UTC form. The
//! gateway rejects headers with whitespace after the commas, hence the
//! deliberately unspaced format string.

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer};
use sha2::Sha256;
use std::env;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const API_HOST: &str = "https://api-gateway.coupang.com";
const SEARCH_PATH: &str = "/v2/providers/affiliate_open_api/apis/openapi/products/search";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ACCESS_KEY_VAR: &str = "COUPANG_ACCESS_KEY";
pub const SECRET_KEY_VAR: &str = "COUPANG_SECRET_KEY";
pub const SUB_ID_VAR: &str = "COUPANG_SUB_ID";

/// One product from a search response, reduced to the fields the ingestion
/// step consumes.
#[derive(Clone, Debug, Deserialize)]
pub struct SearchProduct {
    #[serde(rename = "productName", default)]
    pub name: String,

    #[serde(rename = "productPrice", default, deserialize_with = "deserialize_price")]
    pub price: u64,

    #[serde(rename = "productImage", default)]
    pub image: String,

    #[serde(rename = "productUrl", default)]
    pub link: String,
}

// The gateway has been observed returning prices as integers, floats, and
// grouped strings ("1,234"), so accept all three.
fn deserialize_price<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if let Some(u) = value.as_u64() {
        return Ok(u);
    }
    if let Some(f) = value.as_f64() {
        if f.is_finite() && f >= 0.0 {
            return Ok(f.round() as u64);
        }
    }
    if let Some(s) = value.as_str() {
        if let Ok(u) = s.trim().replace(',', "").parse::<u64>() {
            return Ok(u);
        }
    }
    Ok(0)
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "rCode")]
    r_code: String,

    #[serde(rename = "rMessage", default)]
    r_message: String,

    data: Option<EnvelopeData>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(rename = "productData", default)]
    product_data: Vec<SearchProduct>,
}

/// An authenticated client for the affiliate gateway.
pub struct Client {
    access_key: String,
    secret_key: String,
    sub_id: String,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(access_key: String, secret_key: String, sub_id: String) -> Result<Client> {
        Client::with_timeout(access_key, secret_key, sub_id, DEFAULT_TIMEOUT)
    }

    /// Like [`Client::new`] with a caller-supplied timeout covering the whole
    /// request (connect through body).
    pub fn with_timeout(
        access_key: String,
        secret_key: String,
        sub_id: String,
        timeout: Duration,
    ) -> Result<Client> {
        Ok(Client {
            access_key,
            secret_key,
            sub_id,
            http: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
        })
    }

    /// Builds a client from `COUPANG_ACCESS_KEY` / `COUPANG_SECRET_KEY`
    /// (plus the optional `COUPANG_SUB_ID` channel id).
    pub fn from_env() -> Result<Client> {
        let access_key =
            env::var(ACCESS_KEY_VAR).map_err(|_| Error::Credentials(ACCESS_KEY_VAR))?;
        let secret_key =
            env::var(SECRET_KEY_VAR).map_err(|_| Error::Credentials(SECRET_KEY_VAR))?;
        let sub_id = env::var(SUB_ID_VAR).unwrap_or_default();
        Client::new(access_key, secret_key, sub_id)
    }

    /// Searches the affiliate catalog for `keyword`, returning at most
    /// `limit` products. A response with a non-zero `rCode` or a non-success
    /// HTTP status is an upstream error; a success envelope with no data
    /// section is an empty result, not an error.
    pub fn search_products(&self, keyword: &str, limit: usize) -> Result<Vec<SearchProduct>> {
        let query = format!(
            "keyword={}&limit={}&subId={}",
            utf8_percent_encode(keyword, NON_ALPHANUMERIC),
            limit,
            utf8_percent_encode(&self.sub_id, NON_ALPHANUMERIC),
        );
        let path_and_query = format!("{}?{}", SEARCH_PATH, query);
        let authorization = self.authorization("GET", &path_and_query)?;

        let response = self
            .http
            .get(&format!("{}{}", API_HOST, path_and_query))
            .header("Authorization", authorization)
            .header("Content-Type", "application/json;charset=UTF-8")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: truncate(&body, 220),
            });
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|err| Error::Parse {
            err,
            head: truncate(&body, 220),
        })?;
        if envelope.r_code != "0" {
            return Err(Error::Api {
                code: envelope.r_code,
                message: envelope.r_message,
            });
        }

        Ok(envelope
            .data
            .map(|data| data.product_data)
            .unwrap_or_default())
    }

    /// The `CEA` authorization header for a request, signed with the current
    /// clock.
    pub fn authorization(&self, method: &str, path_and_query: &str) -> Result<String> {
        let datetime = chrono::Utc::now().format("%y%m%dT%H%M%SZ").to_string();
        self.authorization_with_date(method, path_and_query, &datetime)
    }

    fn authorization_with_date(
        &self,
        method: &str,
        path_and_query: &str,
        datetime: &str,
    ) -> Result<String> {
        let mut parts = path_and_query.splitn(3, '?');
        // splitn always yields at least one part
        let path = parts.next().unwrap();
        let query = parts.next().unwrap_or("");
        if parts.next().is_some() {
            return Err(Error::RequestPath(path_and_query.to_owned()));
        }

        let message = format!("{}{}{}{}", datetime, method, path, query);
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| Error::Credentials(SECRET_KEY_VAR))?;
        mac.update(message.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        // No whitespace after the commas; the gateway is strict about it.
        Ok(format!(
            "CEA algorithm=HmacSHA256,access-key={},signed-date={},signature={}",
            self.access_key, datetime, signature
        ))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a failed interaction with the affiliate gateway. During batch
/// ingestion these are recoverable at keyword granularity: the caller logs
/// the error and moves on to the next keyword.
#[derive(Debug)]
pub enum Error {
    /// Returned when a required credential variable is missing or unusable.
    Credentials(&'static str),

    /// Returned when a request path has more than one `?` separator.
    RequestPath(String),

    /// Returned for transport-level failures (connect, timeout, TLS).
    Http(reqwest::Error),

    /// Returned when the gateway answers with a non-success HTTP status.
    Status { status: u16, body: String },

    /// Returned when the gateway answers with a non-zero result code.
    Api { code: String, message: String },

    /// Returned when the response body is not the expected envelope.
    Parse {
        err: serde_json::Error,
        head: String,
    },
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Credentials(var) => write!(f, "Missing or invalid credential: {}", var),
            Error::RequestPath(path) => write!(f, "Malformed request path: {}", path),
            Error::Http(err) => err.fmt(f),
            Error::Status { status, body } => {
                write!(f, "Gateway returned HTTP {}: {}", status, body)
            }
            Error::Api { code, message } => {
                write!(f, "Gateway returned rCode={}: {}", code, message)
            }
            Error::Parse { err, head } => {
                write!(f, "Unexpected gateway response ({}): {}", err, head)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            Error::Parse { err, head: _ } => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    /// Converts [`reqwest::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: reqwest::Error) -> Error {
        Error::Http(err)
    }
}
