//! # Engagement Repository
//!
//! Read model of a user's active engagements joined with their client.

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::models::client::Entity as Client;
use crate::models::engagement::{Column, Entity, STATUS_ACTIVE};

/// Engagement fields the suggestion matcher scores against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementCandidate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub client_name: String,
    pub client_company_name: Option<String>,
    pub hourly_rate_cents: i64,
}

#[derive(Clone)]
pub struct EngagementRepository {
    db: Arc<DatabaseConnection>,
}

impl EngagementRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Active engagements in ascending id order
    pub async fn list_active_candidates(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<EngagementCandidate>, DbErr> {
        let rows = Entity::find()
            .find_also_related(Client)
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(STATUS_ACTIVE))
            .order_by_asc(Column::Id)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(engagement, client)| {
                let (client_name, client_company_name) = client
                    .map(|c| (c.name, c.company_name))
                    .unwrap_or_default();
                EngagementCandidate {
                    id: engagement.id,
                    name: engagement.name,
                    description: engagement.description,
                    client_name,
                    client_company_name,
                    hourly_rate_cents: engagement.hourly_rate_cents,
                }
            })
            .collect())
    }
}
