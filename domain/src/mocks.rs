//! Mocked read model, used by the acceptance suite and unit tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::{ColumnType, Field, Persisted, ID_COLUMN};
use crate::Entity;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub version: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Model {
    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl Persisted for Model {
    fn fields() -> &'static [Field<Self>] {
        static FIELDS: [Field<Model>; 4] = [
            Field::<Model>::new(
                ID_COLUMN,
                ColumnType::Uuid,
                |m| m.id.into(),
                |m, v| {
                    m.id = v.try_into()?;
                    Ok(())
                },
            ),
            Field::<Model>::new(
                "version",
                ColumnType::Integer,
                |m| m.version.into(),
                |m, v| {
                    m.version = v.try_into()?;
                    Ok(())
                },
            ),
            Field::<Model>::new(
                "content",
                ColumnType::Text,
                |m| m.content.clone().into(),
                |m, v| {
                    m.content = v.try_into()?;
                    Ok(())
                },
            ),
            Field::<Model>::new(
                "created_at",
                ColumnType::Timestamp,
                |m| m.created_at.into(),
                |m, v| {
                    m.created_at = v.try_into()?;
                    Ok(())
                },
            ),
        ];
        &FIELDS
    }
}
