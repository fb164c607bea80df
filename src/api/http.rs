//! REST client for the onboarding backend.
//!
//! Every endpoint answers with an envelope `{success, message, data}`. A
//! non-2xx status or `success: false` becomes `ApiError::Rejected` carrying
//! the server's `message`, which is what the user ends up seeing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{
    FileUpload, OnboardingApi, OnboardingCompleted, OtpSent, OtpVerified, SignupCompleted,
    SiteConfirmations, SiteCreated, SiteStatus, StepContext, UploadReceipt, UserState,
    WidgetScript, WidgetVerification,
};
use crate::error::{fallback_message, ApiError, ConfigError};
use crate::onboarding::model::ContactInfo;
use crate::onboarding::OnboardingStep;

/// The onboarding backend over HTTPS.
pub struct HttpApiClient {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct TempTokenData {
    temp_token: String,
}

#[derive(Deserialize)]
struct SignupData {
    user_id: String,
    access_token: String,
}

impl HttpApiClient {
    /// Build a client. `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and return the envelope's `data` payload.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<serde_json::Value, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Transport {
            operation,
            reason: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            operation,
            reason: e.to_string(),
        })?;
        debug!(operation, status = status.as_u16(), "Onboarding API responded");

        parse_envelope(operation, status, &body)
    }

    async fn send_as<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let data = self.send(operation, request).await?;
        decode(operation, data)
    }
}

/// Interpret a raw response body according to the envelope contract.
pub(crate) fn parse_envelope(
    operation: &'static str,
    status: StatusCode,
    body: &str,
) -> Result<serde_json::Value, ApiError> {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = json
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("detail")))
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(String::from);

    if !status.is_success() {
        return Err(ApiError::Rejected {
            operation,
            status: Some(status.as_u16()),
            message: message.unwrap_or_else(|| fallback_message(operation).to_string()),
        });
    }

    let Some(json) = json else {
        return Err(ApiError::InvalidResponse {
            operation,
            reason: "response body is not JSON".to_string(),
        });
    };

    if json.get("success").and_then(|s| s.as_bool()) == Some(false) {
        return Err(ApiError::Rejected {
            operation,
            status: Some(status.as_u16()),
            message: message.unwrap_or_else(|| fallback_message(operation).to_string()),
        });
    }

    // Some endpoints answer without an envelope; treat the body as the data.
    match json.get("data") {
        Some(data) => Ok(data.clone()),
        None => Ok(json),
    }
}

fn decode<T: DeserializeOwned>(
    operation: &'static str,
    data: serde_json::Value,
) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|e| ApiError::InvalidResponse {
        operation,
        reason: e.to_string(),
    })
}

#[async_trait]
impl OnboardingApi for HttpApiClient {
    async fn send_otp(&self, email: &str) -> Result<OtpSent, ApiError> {
        let request = self
            .client
            .post(self.url("/onboarding/send-otp"))
            .json(&serde_json::json!({ "email": email }));
        let data = self.send("send_otp", request).await?;
        Ok(OtpSent {
            success: true,
            message: data
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("OTP sent successfully")
                .to_string(),
        })
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<OtpVerified, ApiError> {
        let request = self
            .client
            .post(self.url("/onboarding/verify-otp"))
            .json(&serde_json::json!({ "email": email, "otp_code": code }));
        let data: TempTokenData = self.send_as("verify_otp", request).await?;
        Ok(OtpVerified {
            temp_token: SecretString::from(data.temp_token),
        })
    }

    async fn complete_signup(
        &self,
        password: &SecretString,
        temp_token: &SecretString,
    ) -> Result<SignupCompleted, ApiError> {
        let request = self
            .client
            .post(self.url("/onboarding/complete-profile"))
            .bearer_auth(temp_token.expose_secret())
            .json(&serde_json::json!({ "password": password.expose_secret() }));
        let data: SignupData = self.send_as("complete_signup", request).await?;
        Ok(SignupCompleted {
            user_id: data.user_id,
            access_token: SecretString::from(data.access_token),
        })
    }

    async fn create_site(
        &self,
        access_token: &SecretString,
        domain: &str,
        confirmations: SiteConfirmations,
    ) -> Result<SiteCreated, ApiError> {
        let request = self
            .client
            .post(self.url("/onboarding/setup-domain"))
            .bearer_auth(access_token.expose_secret())
            .json(&serde_json::json!({ "domain": domain, "confirmations": confirmations }));
        self.send_as("create_site", request).await
    }

    async fn get_site_status(
        &self,
        access_token: &SecretString,
        site_id: &str,
    ) -> Result<SiteStatus, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/sites/{site_id}/status")))
            .bearer_auth(access_token.expose_secret());
        self.send_as("get_site_status", request).await
    }

    async fn upload_text(
        &self,
        access_token: &SecretString,
        site_id: &str,
        text: &str,
    ) -> Result<UploadReceipt, ApiError> {
        let request = self
            .client
            .post(self.url("/content/upload-text"))
            .bearer_auth(access_token.expose_secret())
            .json(&serde_json::json!({ "site_id": site_id, "content": text }));
        self.send_as("upload_text", request).await
    }

    async fn upload_file(
        &self,
        access_token: &SecretString,
        site_id: &str,
        file: &FileUpload,
    ) -> Result<UploadReceipt, ApiError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| ApiError::InvalidResponse {
                operation: "upload_file",
                reason: format!("invalid content type {}: {e}", file.mime_type),
            })?;
        let form = Form::new()
            .text("site_id", site_id.to_string())
            .part("files", part);

        let request = self
            .client
            .post(self.url("/content/upload-file"))
            .bearer_auth(access_token.expose_secret())
            .multipart(form);
        self.send_as("upload_file", request).await
    }

    async fn update_contact_info(
        &self,
        access_token: &SecretString,
        site_id: &str,
        contact: &ContactInfo,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url("/content/fallback-info"))
            .bearer_auth(access_token.expose_secret())
            .json(&serde_json::json!({ "site_id": site_id, "fallback_info": contact }));
        self.send("update_contact_info", request).await?;
        Ok(())
    }

    async fn generate_widget(
        &self,
        access_token: &SecretString,
        site_id: &str,
    ) -> Result<WidgetScript, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/sites/{site_id}/widget-script")))
            .bearer_auth(access_token.expose_secret());
        self.send_as("generate_widget", request).await
    }

    async fn verify_widget(
        &self,
        access_token: &SecretString,
        site_id: &str,
        page_url: &str,
    ) -> Result<WidgetVerification, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/sites/{site_id}/verify-widget")))
            .bearer_auth(access_token.expose_secret())
            .json(&serde_json::json!({ "page_url": page_url }));
        self.send_as("verify_widget", request).await
    }

    async fn get_user_state(&self, access_token: &SecretString) -> Result<UserState, ApiError> {
        let request = self
            .client
            .get(self.url("/onboarding/user-state"))
            .bearer_auth(access_token.expose_secret());
        self.send_as("get_user_state", request).await
    }

    async fn update_step(
        &self,
        access_token: Option<&SecretString>,
        completed_step: OnboardingStep,
        context: &StepContext,
    ) -> Result<(), ApiError> {
        let mut request = self
            .client
            .post(self.url("/onboarding/complete-step"))
            .json(&serde_json::json!({ "step": completed_step, "data": context }));
        if let Some(token) = access_token {
            request = request.bearer_auth(token.expose_secret());
        }
        self.send("update_step", request).await?;
        Ok(())
    }

    async fn complete_onboarding(
        &self,
        access_token: &SecretString,
    ) -> Result<OnboardingCompleted, ApiError> {
        let request = self
            .client
            .post(self.url("/onboarding/complete"))
            .bearer_auth(access_token.expose_secret());
        self.send_as("complete_onboarding", request).await
    }
}
