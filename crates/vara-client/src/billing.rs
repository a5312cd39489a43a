use serde::Deserialize;
use serde_json::json;
use tracing::info;

use vara_proto::model::{Order, PaymentConfirmation, Plan};

use crate::api::{ApiClient, Backend};
use crate::error::{ClientError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanList {
    List(Vec<Plan>),
    Wrapped { plans: Vec<Plan> },
}

/// Premium purchase against the auth backend. The payment gateway itself is
/// driven by the front end; this only creates and confirms orders.
#[derive(Clone)]
pub struct Billing {
    api: ApiClient,
}

impl Billing {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn plans(&self) -> Result<Vec<Plan>> {
        let list: PlanList = self.api.get_json(Backend::Auth, "/api/billing/plans").await?;
        Ok(match list {
            PlanList::List(p) | PlanList::Wrapped { plans: p } => p,
        })
    }

    pub async fn create_order(&self, plan_id: &str) -> Result<Order> {
        if plan_id.trim().is_empty() {
            return Err(ClientError::Validation("Please choose a plan".into()));
        }
        let order: Order = self
            .api
            .post_json(Backend::Auth, "/api/billing/order", &json!({ "planId": plan_id }))
            .await?;
        info!(order_id = %order.order_id, simulated = order.simulated, "billing: order created");
        Ok(order)
    }

    /// Sends the gateway's payment proof for `order` to the backend.
    pub async fn confirm(&self, order: &Order, payment: &PaymentConfirmation) -> Result<()> {
        if payment.order_id != order.order_id {
            return Err(ClientError::Validation(
                "Payment does not belong to this order".into(),
            ));
        }
        self.api
            .post_empty(Backend::Auth, "/api/billing/verify", payment)
            .await?;
        info!(order_id = %order.order_id, "billing: payment confirmed");
        Ok(())
    }

    /// Dev-mode purchase without a gateway.
    pub async fn simulate(&self, plan_id: &str) -> Result<()> {
        self.api
            .post_empty(
                Backend::Auth,
                "/api/billing/simulate",
                &json!({ "planId": plan_id }),
            )
            .await?;
        info!(plan_id, "billing: simulated purchase");
        Ok(())
    }
}
