use uuid::Uuid;

use crate::domain::types::Role;

/// The identity a write is performed on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: Uuid,
    pub role: Role,
}

impl Requester {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    /// Authors may modify their own content; admins may modify anything.
    pub fn can_modify(&self, author_id: Uuid) -> bool {
        self.id == author_id || self.role.is_privileged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authors_and_admins_may_modify() {
        let author = Uuid::new_v4();
        assert!(Requester::new(author, Role::User).can_modify(author));
        assert!(!Requester::new(Uuid::new_v4(), Role::User).can_modify(author));
        assert!(Requester::new(Uuid::new_v4(), Role::Admin).can_modify(author));
    }
}
