// Cloud login
//
// Credential login against `POST /v2/user/login`. Accounts registered with
// a phone number log in with `phoneNumber`, everyone else with `email`.
// A region redirect is followed once.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::auth::{CloudAuth, CloudRegion};
use crate::cloud::client::CloudClient;
use crate::cloud::models::{AUTH_ERROR_CODES, ERR_WRONG_REGION, LoginData, RegionRedirect};
use crate::error::Error;

impl CloudClient {
    /// Authenticate with username and password.
    ///
    /// On success the token is kept by the client (see
    /// [`auth`](Self::auth)) and returned. Rejected credentials yield
    /// [`Error::Authentication`]; network trouble yields a transient error.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<CloudAuth, Error> {
        let mut redirected = false;

        loop {
            let url = self.url("/v2/user/login")?;
            debug!(%username, "logging in at {}", url);

            let (status, envelope) = self
                .post_unauthenticated::<Value>(url, &login_body(username, password))
                .await?;

            let Some(envelope) = envelope else {
                return Err(self.rejected_login(status));
            };

            match envelope.error {
                0 => {
                    let data: LoginData = decode(envelope.data)?;
                    let region = data
                        .region
                        .as_deref()
                        .and_then(|r| r.parse::<CloudRegion>().ok())
                        .unwrap_or_else(|| self.region_hint());
                    let auth = CloudAuth {
                        access_token: SecretString::from(data.at),
                        api_key: data.user.apikey,
                        region,
                    };
                    self.set_auth(Some(auth.clone()));
                    info!(%username, %region, "cloud login successful");
                    return Ok(auth);
                }
                ERR_WRONG_REGION if !redirected => {
                    let redirect: RegionRedirect = decode(envelope.data)?;
                    let region = redirect
                        .region
                        .parse::<CloudRegion>()
                        .map_err(|_| Error::WrongRegion {
                            region: redirect.region.clone(),
                        })?;
                    info!(%username, %region, "account lives in another region, retrying");
                    self.switch_region(region)?;
                    self.set_region_hint(region);
                    redirected = true;
                }
                ERR_WRONG_REGION => {
                    let region = decode::<RegionRedirect>(envelope.data)
                        .map(|r| r.region)
                        .unwrap_or_default();
                    return Err(Error::WrongRegion { region });
                }
                code if AUTH_ERROR_CODES.contains(&code) => {
                    self.set_auth(None);
                    return Err(Error::Authentication {
                        message: envelope
                            .msg
                            .unwrap_or_else(|| format!("cloud error {code}")),
                    });
                }
                code => {
                    return Err(Error::CloudApi {
                        code,
                        message: envelope.msg.unwrap_or_default(),
                    });
                }
            }
        }
    }

    /// Error for a login answered with a 4xx status. Only 401/403 reject
    /// the credentials themselves.
    fn rejected_login(&self, status: StatusCode) -> Error {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.set_auth(None);
                Error::Authentication {
                    message: format!("login rejected (HTTP {status})"),
                }
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Error::Throttled {
                status: status.as_u16(),
            },
            _ => Error::CloudApi {
                code: i64::from(status.as_u16()),
                message: format!("login failed (HTTP {status})"),
            },
        }
    }
}

fn login_body(username: &str, password: &SecretString) -> Value {
    let key = if username.starts_with('+') {
        "phoneNumber"
    } else {
        "email"
    };
    let mut body = json!({ "password": password.expose_secret() });
    body[key] = Value::from(username);
    body
}

fn decode<T: serde::de::DeserializeOwned>(data: Option<Value>) -> Result<T, Error> {
    let data = data.unwrap_or(Value::Null);
    serde_json::from_value(data.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: data.to_string(),
    })
}
