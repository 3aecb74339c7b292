/// The caller's identity for one request. An absent token is a valid,
/// anonymous request; resolvers that need a user ask the request context
/// with `require_user`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            user_id: Some(user_id.into()),
        }
    }

    pub fn has_user(&self) -> bool {
        self.user_id.is_some()
    }
}
