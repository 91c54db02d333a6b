/// Bearer Authentication Middleware
///
/// The sole gate for protected routes: extracts the bearer token from the
/// Authorization header, verifies it through the orchestrator (which
/// re-fetches the account, so deactivated accounts are rejected even with a
/// valid token), and injects the authenticated identity into request
/// extensions for handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{extract_bearer, AuthService};
use crate::error::{AppError, AuthError};

pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer)
            .map(str::to_owned);

        let service = self.service.clone();

        Box::pin(async move {
            let token = match token {
                Some(token) => token,
                None => {
                    tracing::warn!("Missing or malformed Authorization header");
                    return Err(AppError::from(AuthError::MissingToken).into());
                }
            };

            let auth = req
                .app_data::<web::Data<AuthService>>()
                .cloned()
                .ok_or_else(|| {
                    AppError::Internal("AuthService not configured".to_string())
                })?;

            // Store outages propagate as 503 here, never as a 401: a store
            // timeout is not an authorization decision.
            let authenticated = auth.verify_access_token(&token).await?;

            tracing::debug!(
                user_id = %authenticated.user.id,
                "Bearer token verified"
            );
            req.extensions_mut().insert(authenticated);

            service.call(req).await
        })
    }
}
