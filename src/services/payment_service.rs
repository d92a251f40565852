// src/services/payment_service.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use qrcode::{render::svg, QrCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CustomerRepository, FinanceRepository, SubscriptionRepository},
    models::{
        auth::Principal,
        finance::{
            NewFinancialTransaction, NewPixCharge, PaymentMethod, PixCharge, PixChargeStatus,
            PixWebhookEvent, TransactionStatus, WebhookOutcome,
        },
        notification::{NotificationChannel, OutboundMessage},
        subscription::Subscription,
    },
    services::notification_service::NotificationService,
};

/// Pedido de cobrança enviado ao provedor.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub payer_name: Option<String>,
    pub payer_phone: Option<String>,
    pub description: String,
    // Referência nossa (ex: "subscription:<id>:<ciclo>"), volta como metadata
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCharge {
    pub charge_id: String,
    pub qr_payload: String,
    pub status: PixChargeStatus,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<GatewayCharge, AppError>;
}

/// Provedor falso e determinístico (id e payload derivados da referência).
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<GatewayCharge, AppError> {
        let digest = hex::encode(Sha256::digest(request.reference.as_bytes()));
        Ok(GatewayCharge {
            charge_id: format!("mock-{}", &digest[..16]),
            qr_payload: format!("PIXMOCK|{}|{}", &digest[..24], request.amount),
            status: PixChargeStatus::Pending,
        })
    }
}

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderChargeResponse {
    id: String,
    qr_code: String,
}

impl HttpGateway {
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Falha ao criar cliente HTTP de pagamentos: {}", e))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), token })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<GatewayCharge, AppError> {
        let response = self
            .client
            .post(format!("{}/charges", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({
                "amount": request.amount,
                "description": request.description,
                "payer": { "name": request.payer_name, "phone": request.payer_phone },
                "metadata": { "reference": request.reference },
            }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamService(format!("Provedor de pagamento indisponível: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamService(format!(
                "Provedor de pagamento respondeu {}",
                response.status()
            )));
        }

        let body: ProviderChargeResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamService(format!("Resposta inválida do provedor de pagamento: {}", e)))?;

        Ok(GatewayCharge { charge_id: body.id, qr_payload: body.qr_code, status: PixChargeStatus::Pending })
    }
}

/// Confere o HMAC-SHA256 (hex) do corpo do webhook.
pub fn verify_webhook_signature(payload: &[u8], signature_hex: &str, secret: &str) -> Result<(), AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| AppError::InvalidSignature)?;
    mac.update(payload);
    let signature = hex::decode(signature_hex.trim()).map_err(|_| AppError::InvalidSignature)?;
    mac.verify_slice(&signature).map_err(|_| AppError::InvalidSignature)
}

fn render_qr_svg(payload: &str) -> Option<String> {
    match QrCode::new(payload.as_bytes()) {
        Ok(code) => Some(code.render::<svg::Color>().min_dimensions(200, 200).build()),
        Err(e) => {
            tracing::warn!(error = %e, "Não foi possível gerar o QR Code da cobrança");
            None
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    finance: Arc<dyn FinanceRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    customers: Arc<dyn CustomerRepository>,
    notifications: NotificationService,
    charge_ttl: chrono::Duration,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        finance: Arc<dyn FinanceRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        customers: Arc<dyn CustomerRepository>,
        notifications: NotificationService,
        charge_ttl: chrono::Duration,
        webhook_secret: Option<String>,
    ) -> Self {
        Self { gateway, finance, subscriptions, customers, notifications, charge_ttl, webhook_secret }
    }

    /// Emite no provedor a cobrança PIX de um ciclo de assinatura e monta
    /// a receita pendente vinculada. Nada é gravado aqui: quem renova persiste
    /// os dois junto com o novo ciclo. Falha do provedor vira UpstreamService.
    pub async fn issue_subscription_charge(
        &self,
        principal: &Principal,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<(NewPixCharge, NewFinancialTransaction), AppError> {
        let customer = self.customers.find(principal.business_id(), subscription.customer_id).await?;

        let request = ChargeRequest {
            amount: subscription.amount,
            payer_name: Some(customer.name.clone()),
            payer_phone: customer.phone.clone(),
            description: format!("Assinatura: {}", subscription.plan_name),
            reference: format!("subscription:{}:{}", subscription.id, subscription.next_billing_date.timestamp()),
        };
        let issued = self.gateway.create_charge(&request).await?;
        tracing::debug!(external_id = %issued.charge_id, "Cobrança emitida no provedor");

        let charge = NewPixCharge {
            qr_svg: render_qr_svg(&issued.qr_payload),
            external_id: issued.charge_id,
            amount: subscription.amount,
            customer_name: Some(customer.name),
            customer_phone: customer.phone,
            qr_payload: issued.qr_payload,
            expires_at: now + self.charge_ttl,
            appointment_id: None,
            subscription_id: Some(subscription.id),
        };

        let mut income = NewFinancialTransaction::income(
            subscription.amount,
            format!("Assinatura: {}", subscription.plan_name),
            Some(PaymentMethod::Pix),
            now.date_naive(),
        );
        income.status = TransactionStatus::Pending;
        income.subscription_id = Some(subscription.id);

        Ok((charge, income))
    }

    pub async fn find_charge(&self, principal: &Principal, charge_id: Uuid) -> Result<PixCharge, AppError> {
        self.finance.find_pix_charge(principal.business_id(), charge_id).await
    }

    /// Sem segredo configurado a verificação é desligada.
    pub fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        match &self.webhook_secret {
            None => Ok(()),
            Some(secret) => {
                let signature = signature.ok_or(AppError::InvalidSignature)?;
                verify_webhook_signature(payload, signature, secret)
            }
        }
    }

    /// Liquida a cobrança informada pelo provedor. Eventos repetidos ou sobre
    /// cobrança já liquidada não mudam nada (applied = false).
    pub async fn handle_webhook(&self, event: PixWebhookEvent) -> Result<WebhookOutcome, AppError> {
        let charge = self
            .finance
            .find_pix_charge_by_external(&event.charge_id)
            .await?
            .ok_or_else(|| AppError::not_found("Cobrança PIX", &event.charge_id))?;

        if event.status == PixChargeStatus::Pending {
            return Ok(WebhookOutcome { applied: false, charge });
        }

        let Some(settled) = self.finance.settle_pix_charge(charge.id, event.status, Utc::now()).await? else {
            tracing::info!(external_id = %event.charge_id, status = ?charge.status, "Webhook repetido ignorado");
            return Ok(WebhookOutcome { applied: false, charge });
        };

        if settled.status == PixChargeStatus::Paid {
            if let Some(subscription_id) = settled.subscription_id {
                let now = Utc::now();
                self.subscriptions
                    .update_with(
                        settled.business_id,
                        subscription_id,
                        Box::new(move |s: &Subscription| Ok(s.with_confirmed_payment(now))),
                    )
                    .await?;
            }
        }

        tracing::info!(charge_id = %settled.id, status = ?settled.status, "✅ Cobrança PIX liquidada");
        Ok(WebhookOutcome { applied: true, charge: settled })
    }

    /// Cobranças pendentes vencidas viram expiradas (e a receita pendente, cancelada).
    pub async fn expire_overdue_charges(&self, principal: &Principal, now: DateTime<Utc>) -> Result<Vec<PixCharge>, AppError> {
        let overdue = self.finance.list_overdue_charges(principal.business_id(), now).await?;

        let mut expired = Vec::with_capacity(overdue.len());
        for charge in overdue {
            if let Some(settled) = self.finance.settle_pix_charge(charge.id, PixChargeStatus::Expired, now).await? {
                expired.push(settled);
            }
        }
        Ok(expired)
    }

    /// Lembrete de pagamento de uma cobrança pendente (WhatsApp do pagador,
    /// senão o contato do cliente da assinatura).
    pub async fn send_charge_reminder(&self, principal: &Principal, charge_id: Uuid) -> Result<PixCharge, AppError> {
        let owner = principal.business_id();
        let charge = self.finance.find_pix_charge(owner, charge_id).await?;
        if charge.status != PixChargeStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Cobrança {} não está pendente ({:?})",
                charge.id, charge.status
            )));
        }

        let message = OutboundMessage {
            subject: "Lembrete de pagamento".to_string(),
            body: format!(
                "Olá! Sua cobrança PIX de R$ {} vence em {}.\nPix Copia e Cola: {}",
                charge.amount,
                charge.expires_at.format("%d/%m/%Y %H:%M"),
                charge.qr_payload
            ),
        };

        match charge.customer_phone.as_deref().filter(|p| !p.is_empty()) {
            Some(phone) => self.notifications.send_direct(NotificationChannel::Whatsapp, phone, &message).await?,
            None => {
                let subscription_id = charge.subscription_id.ok_or_else(|| {
                    AppError::InvalidState(format!("Cobrança {} não tem contato para lembrete", charge.id))
                })?;
                let subscription = self.subscriptions.find(owner, subscription_id).await?;
                let customer = self.customers.find(owner, subscription.customer_id).await?;
                self.notifications.send_to_customer(&customer, &message).await?;
            }
        }

        self.finance.record_charge_reminder(owner, charge_id).await
    }
}
