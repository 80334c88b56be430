use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `is_delete` value of a live record.
pub const NOT_DELETED: i32 = 0;
/// `is_delete` value of a soft-deleted record.
pub const DELETED: i32 = 1;

/// Audit columns shared by every blog table.
///
/// Concrete entities embed it with `#[sqlx(flatten)]` and `#[serde(flatten)]` and expose it
/// through [`Entity`]. The id is assigned once in [`BaseEntity::new`] and has no setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BaseEntity {
    id: String,
    pub create_user: String,
    pub create_time: DateTime<Utc>,
    pub update_user: String,
    pub update_time: DateTime<Utc>,
    pub is_delete: i32,
}

impl BaseEntity {
    /// Starts a new record owned by `create_user`, with a fresh time-ordered id.
    pub fn new(create_user: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), create_user, Utc::now())
    }

    /// Rebuilds a record whose id was assigned elsewhere (e.g. imported rows).
    pub fn with_id(
        id: impl Into<String>,
        create_user: impl Into<String>,
        create_time: DateTime<Utc>,
    ) -> Self {
        let create_user = create_user.into();
        Self {
            id: id.into(),
            update_user: create_user.clone(),
            create_user,
            create_time,
            update_time: create_time,
            is_delete: NOT_DELETED,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Records a mutation by `user`.
    pub fn touch(&mut self, user: impl Into<String>) {
        self.update_user = user.into();
        self.update_time = Utc::now();
    }

    pub fn mark_deleted(&mut self, user: impl Into<String>) {
        self.is_delete = DELETED;
        self.touch(user);
    }

    pub fn restore(&mut self, user: impl Into<String>) {
        self.is_delete = NOT_DELETED;
        self.touch(user);
    }

    /// Any non-zero marker counts as deleted.
    pub fn is_deleted(&self) -> bool {
        self.is_delete != NOT_DELETED
    }
}

/// Implemented by domain records that embed a [`BaseEntity`].
pub trait Entity {
    fn base(&self) -> &BaseEntity;
    fn base_mut(&mut self) -> &mut BaseEntity;

    fn id(&self) -> &str {
        self.base().id()
    }

    fn is_deleted(&self) -> bool {
        self.base().is_deleted()
    }

    fn soft_delete(&mut self, user: impl Into<String>)
    where
        Self: Sized,
    {
        self.base_mut().mark_deleted(user);
    }
}

impl Entity for BaseEntity {
    fn base(&self) -> &BaseEntity {
        self
    }

    fn base_mut(&mut self) -> &mut BaseEntity {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_is_live_and_self_audited() {
        let entity = BaseEntity::new("admin");

        assert!(!entity.id().is_empty());
        assert_eq!(entity.create_user, "admin");
        assert_eq!(entity.update_user, "admin");
        assert_eq!(entity.create_time, entity.update_time);
        assert_eq!(entity.is_delete, NOT_DELETED);
        assert!(!entity.is_deleted());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = BaseEntity::new("admin");
        let b = BaseEntity::new("admin");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_soft_delete_keeps_id_and_updates_audit() {
        let mut entity = BaseEntity::new("author");
        let id = entity.id().to_string();

        entity.soft_delete("moderator");

        assert_eq!(entity.id(), id);
        assert_eq!(entity.is_delete, DELETED);
        assert!(entity.is_deleted());
        assert_eq!(entity.create_user, "author");
        assert_eq!(entity.update_user, "moderator");
        assert!(entity.update_time >= entity.create_time);

        entity.restore("author");
        assert!(!entity.is_deleted());
    }

    #[test]
    fn test_serde_field_names_match_columns() {
        let entity = BaseEntity::new("admin");
        let value = serde_json::to_value(&entity).unwrap();

        for field in ["id", "create_user", "create_time", "update_user", "update_time", "is_delete"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }
}
