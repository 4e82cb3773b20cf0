use crate::auth::{bearer_token, AuthError, TokenAuthority, UserId};
use crate::reading::ReadingError;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
};
use tracing::warn;

/// Who made the request, as resolved from the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    /// A bearer token was sent but did not verify.
    Rejected,
    User(UserId),
}

impl Identity {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Identity::User(id) => Some(*id),
            _ => None,
        }
    }
}

/// Resolves the bearer token on every request and stores the resulting
/// [`Identity`] in the request extensions. It never rejects a request;
/// handlers that need a user ask for [`AuthenticatedUser`].
pub struct BearerIdentity;

impl<S, B> Transform<S, ServiceRequest> for BearerIdentity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = BearerIdentityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerIdentityMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct BearerIdentityMiddleware<S> {
    service: Rc<S>,
}

fn resolve_identity(req: &ServiceRequest) -> Identity {
    let Some(header_value) = req.headers().get("Authorization") else {
        return Identity::Anonymous;
    };

    let Some(authority) = req.app_data::<web::Data<TokenAuthority>>() else {
        warn!("TokenAuthority missing in app_data");
        return Identity::Rejected;
    };

    match header_value.to_str().ok().and_then(bearer_token) {
        Some(token) => match authority.authenticate(token) {
            Some(user_id) => Identity::User(user_id),
            None => Identity::Rejected,
        },
        None => Identity::Rejected,
    }
}

impl<S, B> Service<ServiceRequest> for BearerIdentityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        let identity = resolve_identity(&req);
        req.extensions_mut().insert(identity);

        Box::pin(async move { srv.call(req).await })
    }
}

fn identity_of(req: &HttpRequest) -> Identity {
    req.extensions()
        .get::<Identity>()
        .copied()
        .unwrap_or(Identity::Anonymous)
}

/// The caller's user id, if a valid token was sent.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<UserId>);

impl FromRequest for MaybeUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(MaybeUser(identity_of(req).user_id())))
    }
}

/// Extractor for routes that require a valid token; fails with 401 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

impl FromRequest for AuthenticatedUser {
    type Error = ReadingError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = match identity_of(req) {
            Identity::User(id) => Ok(AuthenticatedUser(id)),
            Identity::Anonymous => Err(AuthError::MissingToken.into()),
            Identity::Rejected => Err(AuthError::InvalidToken.into()),
        };
        ready(result)
    }
}
