use crate::{
    db::DbPool,
    entities::{technician, work_order},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        count_grouped,
        validation::{ensure_unique, non_blank, required},
    },
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const EMAIL_TAKEN: &str = "A technician with this email already exists";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TechnicianFilters {
    /// Only active technicians when true
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianInput {
    pub name: Option<String>,
    #[validate(email(message = "email must be a valid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianSummary {
    #[serde(flatten)]
    pub technician: technician::Model,
    pub work_order_count: i64,
}

#[derive(Clone)]
pub struct TechnicianService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl TechnicianService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Lists technicians by name with the number of work orders assigned to each.
    #[instrument(skip(self))]
    pub async fn list_technicians(
        &self,
        filters: TechnicianFilters,
    ) -> Result<Vec<TechnicianSummary>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = technician::Entity::find();
        if let Some(active) = filters.active {
            query = query.filter(technician::Column::Active.eq(active));
        }
        let technicians = query.order_by_asc(technician::Column::Name).all(db).await?;

        let ids: Vec<Uuid> = technicians.iter().map(|t| t.id).collect();
        let assigned = count_grouped::<work_order::Entity, _>(
            db,
            work_order::Column::TechnicianId,
            work_order::Column::Id,
            &ids,
        )
        .await?;

        Ok(technicians
            .into_iter()
            .map(|technician| TechnicianSummary {
                work_order_count: assigned.get(&technician.id).copied().unwrap_or(0),
                technician,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_technician(&self, id: Uuid) -> Result<technician::Model, ServiceError> {
        technician::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Technician"))
    }

    #[instrument(skip(self, input))]
    pub async fn create_technician(
        &self,
        input: TechnicianInput,
    ) -> Result<technician::Model, ServiceError> {
        let name = required("name", input.name.clone())?;
        let email = required("email", input.email.clone())?;
        input.validate()?;

        let db = &*self.db_pool;
        let email = email.trim().to_lowercase();
        ensure_unique::<technician::Entity, _>(
            db,
            technician::Column::Email,
            &email,
            technician::Column::Id,
            None,
            EMAIL_TAKEN,
        )
        .await?;

        let technician = technician::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            email: Set(email),
            phone: Set(non_blank(input.phone)),
            active: Set(input.active.unwrap_or(true)),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| ServiceError::unique_violation_or_db(e, EMAIL_TAKEN))?;

        info!(technician_id = %technician.id, "technician created");
        self.event_sender
            .publish([Event::TechnicianCreated(technician.id)])
            .await;
        Ok(technician)
    }

    #[instrument(skip(self, input))]
    pub async fn update_technician(
        &self,
        id: Uuid,
        input: TechnicianInput,
    ) -> Result<technician::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db_pool;
        let existing = self.get_technician(id).await?;

        let mut active: technician::ActiveModel = existing.into();
        if let Some(name) = non_blank(input.name) {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = non_blank(input.email) {
            let email = email.trim().to_lowercase();
            ensure_unique::<technician::Entity, _>(
                db,
                technician::Column::Email,
                &email,
                technician::Column::Id,
                Some(id),
                EMAIL_TAKEN,
            )
            .await?;
            active.email = Set(email);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(non_blank(Some(phone)));
        }
        if let Some(flag) = input.active {
            active.active = Set(flag);
        }

        let technician = active
            .update(db)
            .await
            .map_err(|e| ServiceError::unique_violation_or_db(e, EMAIL_TAKEN))?;
        info!(technician_id = %id, "technician updated");
        self.event_sender
            .publish([Event::TechnicianUpdated(id)])
            .await;
        Ok(technician)
    }
}
