//! Contains a remote implementation using HTTP to interact with the contacts service.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::RequestError;
use crate::workload::Query;

/// Default timeout applied to every single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time an idle pooled connection is kept open.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Default number of idle connections kept per host, one per default write and read worker.
pub const DEFAULT_POOL_SIZE: usize = 200;

/// Page size requested by every read, the maximum the services allow.
pub const QUERY_LIMIT: u32 = 10_000;

/// A contact as returned by the service after a successful create.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Contact {
    /// Service-assigned identifier. Numeric identifiers are rendered as strings.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// The external key the contact was created with.
    pub external_id: u64,
    /// The phone number the contact was created with.
    pub phone_number: String,
    /// Creation timestamp, opaque to the benchmark.
    #[serde(default)]
    pub date_created: Option<serde_json::Value>,
    /// Update timestamp, opaque to the benchmark.
    #[serde(default)]
    pub date_updated: Option<serde_json::Value>,
}

/// The body of a create request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NewContact {
    /// External key, not required to be unique.
    pub external_id: u64,
    /// Phone number, not required to be unique.
    pub phone_number: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// A builder for creating an [`HttpRemote`].
#[derive(Debug)]
pub struct HttpRemoteBuilder {
    base_url: String,
    pool_size: usize,
    timeout: Duration,
    idle_timeout: Duration,
}

impl HttpRemoteBuilder {
    /// The maximum number of idle connections kept per host.
    ///
    /// This should be at least the number of concurrent workers, or connections are torn down and
    /// re-established under load.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// The total timeout of a single request, including reading the body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long idle connections are kept in the pool.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Creates the remote and its underlying connection pool.
    pub fn build(self) -> Result<HttpRemote, reqwest::Error> {
        let client = Client::builder()
            .pool_max_idle_per_host(self.pool_size)
            .pool_idle_timeout(self.idle_timeout)
            .timeout(self.timeout)
            .build()?;

        Ok(HttpRemote {
            base_url: self.base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }
}

/// A remote implementation using HTTP to interact with the contacts service.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    base_url: String,
    client: Client,
}

impl HttpRemote {
    /// Constructs a new builder pointing at the given service root.
    pub fn builder(base_url: impl Into<String>) -> HttpRemoteBuilder {
        HttpRemoteBuilder {
            base_url: base_url.into(),
            pool_size: DEFAULT_POOL_SIZE,
            timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Returns the service root without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn contacts_url(&self) -> String {
        format!("{}/contacts", self.base_url)
    }

    /// Creates a contact with `POST /contacts` and decodes the created record.
    pub async fn create_contact(&self, contact: &NewContact) -> Result<Contact, RequestError> {
        let response = self
            .client
            .post(self.contacts_url())
            .json(contact)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }

        let created: Contact = serde_json::from_slice(&body)?;
        if created.id.is_empty() {
            return Err(RequestError::MissingId);
        }

        Ok(created)
    }

    /// Queries contacts with `GET /contacts`, returning the number of body bytes received.
    ///
    /// The body is drained and discarded so the connection can return to the pool.
    pub async fn query_contacts(&self, query: &Query) -> Result<u64, RequestError> {
        let (key, value) = query.filter();
        let mut response = self
            .client
            .get(self.contacts_url())
            .query(&[
                (key, value),
                ("limit", QUERY_LIMIT.to_string()),
                ("offset", "0".to_owned()),
            ])
            .send()
            .await?;

        let mut received = 0;
        while let Some(chunk) = response.chunk().await? {
            received += chunk.len() as u64;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_and_numeric_ids() {
        let contact: Contact = serde_json::from_str(
            r#"{"id":"abc","external_id":7,"phone_number":"+79990000007","date_created":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(contact.id, "abc");
        assert_eq!(contact.date_updated, None);

        let contact: Contact =
            serde_json::from_str(r#"{"id":42,"external_id":7,"phone_number":"+7999"}"#).unwrap();
        assert_eq!(contact.id, "42");
    }

    #[test]
    fn rejects_contacts_without_fields() {
        assert!(serde_json::from_str::<Contact>(r#"{"id":"abc"}"#).is_err());
        assert!(serde_json::from_str::<Contact>("[]").is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let remote = HttpRemote::builder("http://localhost:8080/").build().unwrap();
        assert_eq!(remote.base_url(), "http://localhost:8080");
        assert_eq!(remote.contacts_url(), "http://localhost:8080/contacts");
    }
}
