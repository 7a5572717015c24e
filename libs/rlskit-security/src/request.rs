//! Typed view of an inbound request, as seen by resolvers and bypass checks.
//!
//! Resolvers never probe an arbitrary request shape. They read what the host
//! put into a [`RequestContext`]: the authenticated identity (if any) and the
//! transport metadata of the call.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::value::Scalar;

/// Authenticated caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    subject_id: Option<Scalar>,
    is_superuser: bool,
    attributes: BTreeMap<String, Scalar>,
    related: BTreeMap<String, Scalar>,
}

impl Identity {
    #[must_use]
    pub fn builder() -> IdentityBuilder {
        IdentityBuilder::default()
    }

    #[must_use]
    pub fn subject_id(&self) -> Option<&Scalar> {
        self.subject_id.as_ref()
    }

    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }

    /// Direct attribute of the identity, e.g. `tenant_id`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Scalar> {
        self.attributes.get(name)
    }

    /// Id of a related object, e.g. the `tenant` the user belongs to.
    #[must_use]
    pub fn related_id(&self, relation: &str) -> Option<&Scalar> {
        self.related.get(relation)
    }
}

#[derive(Default)]
pub struct IdentityBuilder {
    subject_id: Option<Scalar>,
    is_superuser: bool,
    attributes: BTreeMap<String, Scalar>,
    related: BTreeMap<String, Scalar>,
}

impl IdentityBuilder {
    #[must_use]
    pub fn subject_id(mut self, id: impl Into<Scalar>) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = is_superuser;
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn related(mut self, relation: &str, id: impl Into<Scalar>) -> Self {
        self.related.insert(relation.to_owned(), id.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Identity {
        Identity {
            subject_id: self.subject_id,
            is_superuser: self.is_superuser,
            attributes: self.attributes,
            related: self.related,
        }
    }
}

/// Transport-level facts about the call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportMeta {
    pub method: Option<String>,
    pub path: Option<String>,
    pub client_ip: Option<IpAddr>,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
}

/// Everything a resolver or bypass check may look at for one request.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
    transport: TransportMeta,
}

impl RequestContext {
    #[must_use]
    pub fn new(identity: Option<Identity>, transport: TransportMeta) -> Self {
        Self {
            identity,
            transport,
        }
    }

    /// Unauthenticated request with no transport metadata.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            transport: TransportMeta::default(),
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportMeta) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn transport(&self) -> &TransportMeta {
        &self.transport
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.transport.path.as_deref()
    }

    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.transport.client_ip
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.transport
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
