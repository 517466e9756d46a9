//! Deterministic in-process mock backend
//!
//! Serves generation and billing reads when mock mode is enabled
//! (`DESCRIPTA_USE_MOCK_API`), so the engine runs with no backend during
//! local development and in tests. Fixtures are fixed apart from generated
//! ids and clock-relative dates.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::types::{
    AuditLogEntry, BatchResponse, CheckoutRequest, CheckoutSession, CreditBalance, GeneratedItem,
    Paginated, PaymentTransaction, PlanInterval, PortalSession, RateLimitStatus,
    SubscriptionPlan, SubscriptionStatus, TransactionStatus, UsageStats, UserSubscription,
};

pub(crate) fn generate_batch(inputs: &[crate::api::types::ProductInput]) -> BatchResponse {
    let batch_id = format!("batch_{}", Uuid::new_v4().simple());
    let items = inputs
        .iter()
        .map(|input| {
            let mut description = format!(
                "The {} is a dependable pick for any {} lineup. Built around {}, it was designed with {} in mind.",
                input.product_name, input.category, input.features, input.audience
            );
            if let Some(keywords) = &input.keywords {
                description.push_str(&format!(" Shoppers searching for {} will find it here.", keywords));
            }
            GeneratedItem {
                id: format!("item_{}", Uuid::new_v4().simple()),
                product_name: input.product_name.clone(),
                category: input.category.clone(),
                features: input.features.clone(),
                audience: input.audience.clone(),
                description,
                keywords: input.keywords.clone(),
            }
        })
        .collect();
    BatchResponse { batch_id, items }
}

pub(crate) fn fetch_batch(batch_id: &str) -> BatchResponse {
    BatchResponse {
        batch_id: batch_id.to_string(),
        items: vec![GeneratedItem {
            id: "item_mock_1".to_string(),
            product_name: "Travel Mug".to_string(),
            category: "Kitchen".to_string(),
            features: "double-walled, 16oz, leakproof lid".to_string(),
            audience: "commuters".to_string(),
            description: "The Travel Mug keeps drinks hot through the longest Kitchen-to-desk commute."
                .to_string(),
            keywords: None,
        }],
    }
}

fn plan(
    id: &str,
    name: &str,
    price: f64,
    interval: PlanInterval,
    credits: u64,
    variant: &str,
) -> SubscriptionPlan {
    let mut features = vec![
        format!("{} descriptions per month", credits),
        "CSV import and export".to_string(),
        "Email support".to_string(),
    ];
    if credits >= 500 {
        features.insert(1, "Priority generation queue".to_string());
    }
    SubscriptionPlan {
        id: id.to_string(),
        name: name.to_string(),
        price,
        currency: "USD".to_string(),
        interval,
        credits,
        features,
        lemon_squeezy_variant_id: variant.to_string(),
    }
}

pub(crate) fn plans() -> Vec<SubscriptionPlan> {
    vec![
        plan("starter_monthly", "Starter", 9.0, PlanInterval::Monthly, 100, "var_starter_m"),
        plan("starter_yearly", "Starter", 90.0, PlanInterval::Yearly, 100, "var_starter_y"),
        plan("pro_monthly", "Pro", 29.0, PlanInterval::Monthly, 500, "var_pro_m"),
        plan("pro_yearly", "Pro", 290.0, PlanInterval::Yearly, 500, "var_pro_y"),
        plan("scale_monthly", "Scale", 99.0, PlanInterval::Monthly, 2000, "var_scale_m"),
        plan("scale_yearly", "Scale", 990.0, PlanInterval::Yearly, 2000, "var_scale_y"),
    ]
}

pub(crate) fn subscription() -> UserSubscription {
    let pro = plans()
        .into_iter()
        .find(|p| p.id == "pro_monthly")
        .unwrap_or_else(|| plan("pro_monthly", "Pro", 29.0, PlanInterval::Monthly, 500, "var_pro_m"));
    UserSubscription {
        id: "sub_mock_1".to_string(),
        plan_id: pro.id.clone(),
        plan: pro,
        status: SubscriptionStatus::Active,
        cancel_at_period_end: false,
        current_period_end: Utc::now() + Duration::days(20),
    }
}

pub(crate) fn credits() -> CreditBalance {
    CreditBalance {
        current_credits: 350,
        used_credits: 150,
        total_credits: 500,
        reset_date: Some(Utc::now() + Duration::days(20)),
    }
}

pub(crate) fn usage() -> UsageStats {
    UsageStats {
        generations_this_month: 150,
        generations_limit: 500,
        regenerations_this_month: 12,
        period_start: Utc::now() - Duration::days(10),
        period_end: Utc::now() + Duration::days(20),
    }
}

pub(crate) fn payment_history(page: u32, per_page: u32) -> Paginated<PaymentTransaction> {
    let items = vec![
        PaymentTransaction {
            id: "txn_mock_2".to_string(),
            amount: 29.0,
            currency: "USD".to_string(),
            status: TransactionStatus::Paid,
            description: "Pro plan - monthly renewal".to_string(),
            created_at: Utc::now() - Duration::days(10),
        },
        PaymentTransaction {
            id: "txn_mock_1".to_string(),
            amount: 29.0,
            currency: "USD".to_string(),
            status: TransactionStatus::Paid,
            description: "Pro plan - first payment".to_string(),
            created_at: Utc::now() - Duration::days(40),
        },
    ];
    Paginated {
        total: items.len() as u64,
        items: if page <= 1 { items } else { Vec::new() },
        page,
        per_page,
    }
}

pub(crate) fn checkout(request: &CheckoutRequest) -> CheckoutSession {
    CheckoutSession {
        session_id: format!("cs_mock_{}", Uuid::new_v4().simple()),
        checkout_url: format!(
            "https://checkout.lemonsqueezy.com/buy/{}?mock=1",
            request.variant_id
        ),
        expires_at: Some(Utc::now() + Duration::minutes(30)),
    }
}

pub(crate) fn portal() -> PortalSession {
    PortalSession {
        portal_url: "https://billing.descripta.app/portal/mock-session".to_string(),
    }
}

pub(crate) fn cancel_subscription(id: &str) -> UserSubscription {
    let mut sub = subscription();
    sub.id = id.to_string();
    sub.cancel_at_period_end = true;
    sub
}

pub(crate) fn reactivate_subscription(id: &str) -> UserSubscription {
    let mut sub = subscription();
    sub.id = id.to_string();
    sub.cancel_at_period_end = false;
    sub
}

pub(crate) fn update_subscription(id: &str, variant_id: &str) -> UserSubscription {
    let mut sub = subscription();
    sub.id = id.to_string();
    if let Some(plan) = plans()
        .into_iter()
        .find(|p| p.lemon_squeezy_variant_id == variant_id)
    {
        sub.plan_id = plan.id.clone();
        sub.plan = plan;
    }
    sub
}

pub(crate) fn replay_ack() -> Value {
    json!({ "received": true, "mock": true })
}

pub(crate) fn audit_logs(page: u32, per_page: u32) -> Paginated<AuditLogEntry> {
    let items = vec![
        AuditLogEntry {
            id: "audit_mock_2".to_string(),
            timestamp: Utc::now() - Duration::hours(2),
            actor: "maker@example.com".to_string(),
            action: "checkout.session.created".to_string(),
            endpoint: "/api/payment/checkout".to_string(),
            detail: Some("plan pro_monthly".to_string()),
        },
        AuditLogEntry {
            id: "audit_mock_1".to_string(),
            timestamp: Utc::now() - Duration::days(1),
            actor: "maker@example.com".to_string(),
            action: "subscription.updated".to_string(),
            endpoint: "/payments/subscription/sub_mock_1/update".to_string(),
            detail: None,
        },
    ];
    Paginated {
        total: items.len() as u64,
        items: if page <= 1 { items } else { Vec::new() },
        page,
        per_page,
    }
}

pub(crate) fn rate_limit_status(endpoint: &str) -> RateLimitStatus {
    RateLimitStatus {
        endpoint: endpoint.to_string(),
        limit: 60,
        remaining: 58,
        reset_at: Utc::now() + Duration::seconds(42),
    }
}

pub(crate) fn transaction(id: &str) -> PaymentTransaction {
    PaymentTransaction {
        id: id.to_string(),
        amount: 29.0,
        currency: "USD".to_string(),
        status: TransactionStatus::Paid,
        description: "Pro plan - monthly renewal".to_string(),
        created_at: Utc::now() - Duration::days(10),
    }
}
