//! Client signature construction.

use bytes::Bytes;
use opclink_core::{ServiceError, types::SignatureData};

use crate::services::{CryptoProvider, SecureChannelInfo};

/// Build the client signature sent in (re)activation requests.
///
/// The server expects a signature over its own certificate concatenated
/// with the nonce it issued last. Under the `None` policy there is
/// nothing to sign and the empty signature is returned.
pub fn build_client_signature(
    crypto: &dyn CryptoProvider,
    channel: &SecureChannelInfo,
    server_nonce: &Bytes,
) -> Result<SignatureData, ServiceError> {
    let Some(algorithm) = channel.security_policy.signature_algorithm_uri() else {
        return Ok(SignatureData::empty());
    };

    let mut data = Vec::with_capacity(channel.remote_certificate.len() + server_nonce.len());
    data.extend_from_slice(&channel.remote_certificate);
    data.extend_from_slice(server_nonce);

    let signature = crypto.sign(channel.security_policy, &data)?;

    Ok(SignatureData { algorithm: Some(algorithm.to_string()), signature })
}
