/// Request-scoped actor information threaded through write paths
///
/// Every mutating model call takes a `&RequestContext` so `created_by` and
/// `updated_by` columns are stamped from an explicit value rather than from
/// ambient state.
///
/// # Example
///
/// ```
/// use plane_shared::context::RequestContext;
/// use uuid::Uuid;
///
/// let ctx = RequestContext::new(Uuid::new_v4())
///     .with_ip("203.0.113.9")
///     .with_user_agent("curl/8.0");
/// assert_eq!(ctx.ip.as_deref(), Some("203.0.113.9"));
/// ```

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// User performing the request
    pub actor_id: Uuid,

    /// Client address, if known
    pub ip: Option<String>,

    /// Client user agent, if known
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(actor_id: Uuid) -> Self {
        Self {
            actor_id,
            ip: None,
            user_agent: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
