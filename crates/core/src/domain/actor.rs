use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Role under which a caller invokes a lifecycle operation.
///
/// The marketplace has exactly three actor kinds: the client who filed the
/// request, the professional (artisan) executing it, and the admin
/// intermediary pricing and arbitrating it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Client,
    Professional,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Professional => "professional",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Self::Client),
            "professional" => Some(Self::Professional),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: ActorId(id.into()), role }
    }
}

#[cfg(test)]
mod tests {
    use super::ActorRole;

    #[test]
    fn actor_role_round_trips_from_storage_encoding() {
        for role in [ActorRole::Client, ActorRole::Professional, ActorRole::Admin] {
            assert_eq!(ActorRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn actor_role_parse_rejects_unknown_values() {
        assert_eq!(ActorRole::parse("supervisor"), None);
    }
}
