//! Integration tests for polysync-http
//!
//! Uses wiremock to simulate a storage backend and verifies end-to-end
//! behavior of the request envelope, multipart uploads, ranged downloads,
//! single-shot uploads, config-driven handle selection and account
//! authorization.

mod common;

mod test_auth;
mod test_download;
mod test_envelope;
mod test_multipart;
mod test_transfer;
mod test_upload;
