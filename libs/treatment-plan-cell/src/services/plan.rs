// libs/treatment-plan-cell/src/services/plan.rs
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    ItemStatus, PhaseView, PlanError, TreatmentPlan, TreatmentPlanItem, TreatmentPlanPhase,
    TreatmentPlanView,
};

/// Store for the plan → phase → item hierarchy. Every read hits the
/// database; callers that need before/after views re-read rather than reuse
/// stale rows.
pub struct TreatmentPlanService {
    supabase: SupabaseClient,
}

impl TreatmentPlanService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_plan(&self, plan_id: Uuid, auth_token: &str) -> Result<TreatmentPlan, PlanError> {
        let path = format!("/rest/v1/treatment_plans?id=eq.{}", plan_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PlanError::NotFound)?;
        serde_json::from_value(row).map_err(|e| PlanError::DatabaseError(e.to_string()))
    }

    /// Full plan read model for the back-office UI: plan, phases in order,
    /// items in order.
    pub async fn get_plan_view(
        &self,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlanView, PlanError> {
        let plan = self.get_plan(plan_id, auth_token).await?;
        let phases = self.phases_in_plan(plan_id, auth_token).await?;

        let mut phase_views = Vec::with_capacity(phases.len());
        for phase in phases {
            let items = self.items_in_phase(phase.id, auth_token).await?;
            phase_views.push(PhaseView { phase, items });
        }

        Ok(TreatmentPlanView {
            plan,
            phases: phase_views,
        })
    }

    pub async fn get_phase(
        &self,
        phase_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlanPhase, PlanError> {
        let path = format!("/rest/v1/treatment_plan_phases?id=eq.{}", phase_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PlanError::PhaseNotFound)?;
        serde_json::from_value(row).map_err(|e| PlanError::DatabaseError(e.to_string()))
    }

    /// All plan items serviced by the given appointment. An appointment with
    /// no linked items is normal (e.g. an unplanned emergency visit).
    pub async fn items_for_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TreatmentPlanItem>, PlanError> {
        debug!("Loading plan items linked to appointment {}", appointment_id);

        let path = format!(
            "/rest/v1/treatment_plan_items?appointment_id=eq.{}&order=sequence.asc",
            appointment_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| PlanError::DatabaseError(e.to_string())))
            .collect()
    }

    pub async fn items_in_phase(
        &self,
        phase_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TreatmentPlanItem>, PlanError> {
        let path = format!(
            "/rest/v1/treatment_plan_items?phase_id=eq.{}&order=sequence.asc",
            phase_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| PlanError::DatabaseError(e.to_string())))
            .collect()
    }

    pub async fn phases_in_plan(
        &self,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TreatmentPlanPhase>, PlanError> {
        let path = format!(
            "/rest/v1/treatment_plan_phases?plan_id=eq.{}&order=sequence.asc",
            plan_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| PlanError::DatabaseError(e.to_string())))
            .collect()
    }

    pub async fn update_item_status(
        &self,
        item_id: Uuid,
        status: ItemStatus,
        completed_at: Option<DateTime<Utc>>,
        auth_token: &str,
    ) -> Result<TreatmentPlanItem, PlanError> {
        debug!("Updating plan item {} to {}", item_id, status);

        let update_data = json!({
            "status": status,
            "completed_at": completed_at.map(|t| t.to_rfc3339()),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/treatment_plan_items?id=eq.{}", item_id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(SupabaseClient::returning_representation()),
            )
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PlanError::ItemNotFound)?;
        serde_json::from_value(row).map_err(|e| PlanError::DatabaseError(e.to_string()))
    }

    /// Puts an item back to a previously captured state. Used when a failed
    /// unit of work has to be unwound.
    pub async fn restore_item(
        &self,
        snapshot: &TreatmentPlanItem,
        auth_token: &str,
    ) -> Result<(), PlanError> {
        debug!("Restoring plan item {} to {}", snapshot.id, snapshot.status);

        let update_data = json!({
            "status": snapshot.status,
            "completed_at": snapshot.completed_at.map(|t| t.to_rfc3339()),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/treatment_plan_items?id=eq.{}", snapshot.id);
        let _rows: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(update_data))
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub async fn mark_phase_completed(
        &self,
        phase_id: Uuid,
        completed_on: NaiveDate,
        auth_token: &str,
    ) -> Result<(), PlanError> {
        debug!("Marking phase {} completed", phase_id);

        let update_data = json!({
            "status": "completed",
            "completed_on": completed_on.format("%Y-%m-%d").to_string(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/treatment_plan_phases?id=eq.{}", phase_id);
        let _rows: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(update_data))
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub async fn mark_plan_completed(&self, plan_id: Uuid, auth_token: &str) -> Result<(), PlanError> {
        debug!("Marking plan {} completed", plan_id);

        let update_data = json!({
            "status": "completed",
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/treatment_plans?id=eq.{}", plan_id);
        let _rows: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(update_data))
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
