use chrono::{DateTime, Utc};
use repo_domain::field::ID_COLUMN;
use repo_domain::{ColumnType, Entity, Field, Persisted};
use serde::Serialize;
use uuid::Uuid;

/// The record managed by the CLI.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Note {
    pub id: Uuid,
    pub version: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Note {
    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl Persisted for Note {
    fn fields() -> &'static [Field<Self>] {
        static FIELDS: [Field<Note>; 4] = [
            Field::<Note>::new(
                ID_COLUMN,
                ColumnType::Uuid,
                |n| n.id.into(),
                |n, v| {
                    n.id = v.try_into()?;
                    Ok(())
                },
            ),
            Field::<Note>::new(
                "version",
                ColumnType::Integer,
                |n| n.version.into(),
                |n, v| {
                    n.version = v.try_into()?;
                    Ok(())
                },
            ),
            Field::<Note>::new(
                "body",
                ColumnType::Text,
                |n| n.body.clone().into(),
                |n, v| {
                    n.body = v.try_into()?;
                    Ok(())
                },
            ),
            Field::<Note>::new(
                "created_at",
                ColumnType::Timestamp,
                |n| n.created_at.into(),
                |n, v| {
                    n.created_at = v.try_into()?;
                    Ok(())
                },
            ),
        ];
        &FIELDS
    }
}
