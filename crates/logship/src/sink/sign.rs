// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! AWS Signature Version 4 for the log service's JSON POST calls.
//!
//! Every request is a POST to `/` with four signed headers
//! (content-type, host, x-amz-date, x-amz-target), which keeps the
//! canonical-request construction small and fixed-shape.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::Credentials;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host;x-amz-date;x-amz-target";

pub(crate) struct SignedRequest {
    pub authorization: String,
    pub amz_date: String,
}

pub(crate) struct RequestSigner {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(credentials: &Credentials, region: &str, service: &str) -> Self {
        RequestSigner {
            access_key_id: credentials.access_key_id.clone(),
            secret_access_key: credentials.secret_access_key.clone(),
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Signs a POST of `body` to `/` on `host` dispatched to `target`.
    pub fn sign(
        &self,
        host: &str,
        target: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> SignedRequest {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);

        let canonical_request = format!(
            "POST\n/\n\ncontent-type:application/x-amz-json-1.1\nhost:{host}\n\
             x-amz-date:{amz_date}\nx-amz-target:{target}\n\n{SIGNED_HEADERS}\n{}",
            sha256_hex(body)
        );

        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let mut key = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            date.as_bytes(),
        );
        key = hmac_sha256(&key, self.region.as_bytes());
        key = hmac_sha256(&key, self.service.as_bytes());
        key = hmac_sha256(&key, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, \
             Signature={signature}",
            self.access_key_id
        );

        SignedRequest {
            authorization,
            amz_date,
        }
    }
}

#[allow(clippy::expect_used)]
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
