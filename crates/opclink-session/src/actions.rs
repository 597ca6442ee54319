//! Action implementations.
//!
//! One async function per [`Action`](crate::state::Action) variant that
//! touches the network. Each runs as its own task, performs its round
//! trip, and reports back by returning exactly one completion event for
//! the driver to feed into the state machine. All suspension in the
//! lifecycle happens here; the state machine itself never awaits.

use std::sync::Arc;

use bytes::Bytes;
use opclink_core::{
    ServiceError, Session, StatusCode,
    config::DEFAULT_CLOSE_TIMEOUT,
    types::{
        ActivateSessionRequest, ActivateSessionResponse, CloseSessionRequest,
        CreateSessionRequest, CreateSessionResponse, NodeId, Request, RequestHeader, Response,
        SecurityPolicy, ServiceRequest, TransferSubscriptionsRequest,
    },
};
use rand::RngCore;

use crate::{
    event::SessionEvent,
    services::SessionServices,
    signature::build_client_signature,
    state::CloseTarget,
};

/// Client nonce length. Servers reject nonces under 32 bytes of entropy.
const NONCE_LENGTH: usize = 32;

fn fresh_nonce() -> Bytes {
    let mut nonce = vec![0_u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    Bytes::from(nonce)
}

fn session_name(services: &SessionServices) -> String {
    services
        .config
        .session_name
        .clone()
        .unwrap_or_else(|| format!("opclink:{}", services.config.application.application_uri))
}

fn unexpected_response() -> ServiceError {
    ServiceError::new(StatusCode::BAD_UNEXPECTED_ERROR, "unexpected response type")
}

async fn send(
    services: &SessionServices,
    auth_token: NodeId,
    body: Request,
) -> Result<Response, ServiceError> {
    let request = ServiceRequest {
        header: RequestHeader { auth_token, timeout: services.config.request_timeout },
        body,
    };
    services.transport.send_request(request).await
}

/// Send a CreateSession request and verify the response.
pub(crate) async fn create_session(services: SessionServices) -> SessionEvent {
    tracing::debug!("creating session");

    match try_create_session(&services).await {
        Ok(response) => SessionEvent::CreateOk { response },
        Err(error) => {
            tracing::debug!("create session failed: {error}");
            SessionEvent::CreateErr { error }
        },
    }
}

async fn try_create_session(
    services: &SessionServices,
) -> Result<CreateSessionResponse, ServiceError> {
    let config = &services.config;
    let endpoint = &config.endpoint;
    let client_nonce = fresh_nonce();

    // Only set when connecting through a gateway; the gateway needs to
    // know which server behind it the session is for.
    let server_uri = endpoint
        .server
        .gateway_server_uri
        .as_ref()
        .map(|_| endpoint.server.application_uri.clone());

    let request = CreateSessionRequest {
        client_description: config.application.clone(),
        server_uri,
        endpoint_url: endpoint.endpoint_url.clone(),
        session_name: session_name(services),
        client_nonce: client_nonce.clone(),
        client_certificate: config.client_certificate.clone(),
        requested_session_timeout: config.session_timeout,
        max_response_message_size: config.max_response_message_size,
    };

    let response = send(services, NodeId::Null, Request::CreateSession(request)).await?;
    let Response::CreateSession(response) = response else {
        return Err(unexpected_response());
    };

    if endpoint.security_policy != SecurityPolicy::None {
        verify_server_signature(services, &response, &client_nonce)?;
    }

    Ok(response)
}

/// Check the server proved possession of the pinned certificate's key by
/// signing the client certificate concatenated with the client nonce.
fn verify_server_signature(
    services: &SessionServices,
    response: &CreateSessionResponse,
    client_nonce: &Bytes,
) -> Result<(), ServiceError> {
    let endpoint = &services.config.endpoint;

    if response.server_certificate.is_empty() {
        return Err(ServiceError::new(
            StatusCode::BAD_SECURITY_CHECKS_FAILED,
            "server did not return a certificate",
        ));
    }
    if response.server_certificate != endpoint.server_certificate {
        return Err(ServiceError::new(
            StatusCode::BAD_SECURITY_CHECKS_FAILED,
            "server certificate does not match the endpoint",
        ));
    }

    let mut data =
        Vec::with_capacity(services.config.client_certificate.len() + client_nonce.len());
    data.extend_from_slice(&services.config.client_certificate);
    data.extend_from_slice(client_nonce);

    services.crypto.verify(
        endpoint.security_policy,
        &response.server_certificate,
        &data,
        &response.server_signature,
    )
}

/// Activate the session described by a verified CreateSession response.
pub(crate) async fn activate_session(
    services: SessionServices,
    response: CreateSessionResponse,
) -> SessionEvent {
    tracing::debug!("activating session");

    match try_activate(&services, response.authentication_token.clone(), &response.server_nonce)
        .await
    {
        Ok(activated) => {
            let session = Arc::new(Session::new(
                response.session_id,
                response.authentication_token,
                session_name(&services),
                response.revised_session_timeout,
                response.max_request_message_size,
                response.server_certificate,
                activated.server_nonce,
            ));
            SessionEvent::ActivateOk { session }
        },
        Err(error) => {
            tracing::debug!("activate session failed: {error}");
            SessionEvent::ActivateErr { error }
        },
    }
}

/// Re-activate an existing session on the current channel.
pub(crate) async fn reactivate_session(
    services: SessionServices,
    session: Arc<Session>,
) -> SessionEvent {
    tracing::debug!("reactivating session");

    let auth_token = session.authentication_token().clone();
    let nonce = session.server_nonce();

    match try_activate(&services, auth_token, &nonce).await {
        Ok(activated) => {
            session.set_server_nonce(activated.server_nonce);
            SessionEvent::ReactivateOk { session }
        },
        Err(error) => {
            tracing::debug!("reactivate session failed: {error}");
            SessionEvent::ReactivateErr { error, session }
        },
    }
}

/// Shared body of first activation and re-activation: the requests are
/// identical, only the auth token and server nonce differ.
async fn try_activate(
    services: &SessionServices,
    auth_token: NodeId,
    server_nonce: &Bytes,
) -> Result<ActivateSessionResponse, ServiceError> {
    let channel = services.transport.wait_for_channel().await?;

    let (user_identity_token, user_token_signature) =
        services.identity.identity_token(&services.config.endpoint, server_nonce).await?;

    let client_signature =
        build_client_signature(services.crypto.as_ref(), &channel, server_nonce)?;

    let request = ActivateSessionRequest {
        client_signature,
        locale_ids: services.config.locale_ids.clone(),
        user_identity_token,
        user_token_signature,
    };

    let response = send(services, auth_token, Request::ActivateSession(request)).await?;
    let Response::ActivateSession(response) = response else {
        return Err(unexpected_response());
    };

    Ok(response)
}

/// Transfer the subscription manager's known subscriptions onto the
/// session.
///
/// Per-subscription failures and "server does not implement the service"
/// are downgraded to success after notifying the subscription manager;
/// only other request-level failures surface as transfer errors.
pub(crate) async fn transfer_subscriptions(
    services: SessionServices,
    session: Arc<Session>,
) -> SessionEvent {
    let subscription_ids = services.subscriptions.subscription_ids().await;
    if subscription_ids.is_empty() {
        return SessionEvent::TransferOk { session };
    }

    tracing::debug!("transferring {} subscriptions", subscription_ids.len());

    let request = TransferSubscriptionsRequest {
        subscription_ids: subscription_ids.clone(),
        send_initial_values: true,
    };

    let result = send(
        &services,
        session.authentication_token().clone(),
        Request::TransferSubscriptions(request),
    )
    .await;

    match result {
        Ok(Response::TransferSubscriptions(response)) => {
            // Results are positional; a length mismatch would leave
            // subscriptions neither transferred nor reported failed.
            if response.results.len() != subscription_ids.len() {
                let error = ServiceError::new(
                    StatusCode::BAD_UNEXPECTED_ERROR,
                    "transfer result count does not match the request",
                );
                return SessionEvent::TransferErr { error, session };
            }
            for (id, result) in subscription_ids.iter().zip(&response.results) {
                if !result.status.is_good() {
                    tracing::warn!("subscription {id} failed to transfer: {}", result.status);
                    services.subscriptions.transfer_failed(*id, result.status).await;
                }
            }
            SessionEvent::TransferOk { session }
        },
        Ok(_) => SessionEvent::TransferErr { error: unexpected_response(), session },
        Err(error) if error.status.is_service_unsupported() => {
            tracing::warn!("server does not support subscription transfer: {}", error.status);
            for id in subscription_ids {
                services.subscriptions.transfer_failed(id, error.status).await;
            }
            SessionEvent::TransferOk { session }
        },
        Err(error) => {
            tracing::debug!("transfer subscriptions failed: {error}");
            SessionEvent::TransferErr { error, session }
        },
    }
}

/// Run all registered session initializers concurrently.
pub(crate) async fn run_initializers(
    services: SessionServices,
    session: Arc<Session>,
) -> SessionEvent {
    let futures = services.initializers.iter().map(|initializer| {
        initializer.initialize(Arc::clone(&services.transport), Arc::clone(&session))
    });

    // Wait for every initializer, then report the first failure
    let results = futures::future::join_all(futures).await;
    match results.into_iter().find_map(Result::err) {
        None => SessionEvent::InitializeOk { session },
        Some(error) => {
            tracing::warn!("session initializer failed: {error}");
            SessionEvent::InitializeErr { error, session }
        },
    }
}

/// Send a CloseSession request.
///
/// Best-effort: a failed or timed-out close is logged and forgotten.
/// Closing always makes forward progress, so this reports success
/// unconditionally.
pub(crate) async fn close_session(services: SessionServices, target: CloseTarget) -> SessionEvent {
    tracing::debug!("closing session {:?}", target.session_id);

    let request = ServiceRequest {
        header: RequestHeader { auth_token: target.auth_token, timeout: DEFAULT_CLOSE_TIMEOUT },
        body: Request::CloseSession(CloseSessionRequest { delete_subscriptions: true }),
    };

    match tokio::time::timeout(DEFAULT_CLOSE_TIMEOUT, services.transport.send_request(request))
        .await
    {
        Ok(Ok(_)) => tracing::debug!("session closed"),
        Ok(Err(error)) => tracing::warn!("close session failed: {error}"),
        Err(_) => tracing::warn!("close session timed out"),
    }

    SessionEvent::CloseOk
}
