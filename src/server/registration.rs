//! One-shot registration of the supported category names with the
//! external category service. Runs once at startup, before the server
//! binds; any non-success response is fatal.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::core::{ServingError, ServingResult};

#[derive(Serialize)]
struct RegisterTypesPayload<'a> {
    types: &'a [&'a str],
}

pub fn register_categories(url: &str, categories: &[&str]) -> ServingResult<()> {
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(10))
        .build();

    match agent
        .post(url)
        .send_json(RegisterTypesPayload { types: categories })
    {
        Ok(_) => {
            info!(url, count = categories.len(), "registered supported categories");
            Ok(())
        }
        Err(ureq::Error::Status(code, response)) => {
            let message = response
                .into_string()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            Err(ServingError::Registration {
                url: url.to_string(),
                status: Some(code),
                message,
            })
        }
        Err(e) => Err(ServingError::Registration {
            url: url.to_string(),
            status: None,
            message: e.to_string(),
        }),
    }
}
