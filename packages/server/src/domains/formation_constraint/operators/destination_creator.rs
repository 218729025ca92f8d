//! `DestinationCreator`: provisions destination-service resources described
//! in negotiated configurations.
//!
//! - Before an assign notification is sent, basic-authentication destinations
//!   listed in the assignment's value are created with the credentials the
//!   reverse assignment received.
//! - When a READY or CONFIG_PENDING result comes back, design-time and SAML
//!   assertion destinations are created. SAML destinations get a certificate
//!   whose content is written into the returned configuration.
//! - Before an unassign notification is sent, everything recorded for the
//!   assignment is deleted.

use anyhow::{Context, Result};
use destination_client::{CertificateInput, DestinationInput};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::domains::formation_assignment::events::NotificationResult;
use crate::domains::formation_assignment::models::{AssignmentOperation, AssignmentState};
use crate::domains::formation_assignment::notifications::AssignmentDetails;
use crate::domains::formation_constraint::models::{DestinationKind, DestinationRecord};
use crate::kernel::ServerDeps;

const AUTH_NONE: &str = "NoAuthentication";
const AUTH_BASIC: &str = "BasicAuthentication";
const AUTH_SAML: &str = "OAuth2SAMLBearerAssertion";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DestinationConfiguration {
    destinations: Vec<DestinationSpec>,
    credentials: Credentials,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Credentials {
    inbound_communication: InboundCommunication,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct InboundCommunication {
    basic_authentication: Option<BasicAuthentication>,
    saml_assertion: Option<SamlAssertion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BasicAuthentication {
    destinations: Vec<DestinationSpec>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SamlAssertion {
    destinations: Vec<DestinationSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinationSpec {
    name: String,
    url: String,
    #[serde(rename = "type", default = "default_type")]
    destination_type: String,
    #[serde(default = "default_proxy_type")]
    proxy_type: String,
    authentication: Option<String>,
    description: Option<String>,
    subaccount_id: Option<String>,
}

fn default_type() -> String {
    "HTTP".to_string()
}

fn default_proxy_type() -> String {
    "Internet".to_string()
}

impl DestinationSpec {
    fn input(&self, authentication: &str) -> DestinationInput {
        DestinationInput {
            name: self.name.clone(),
            destination_type: self.destination_type.clone(),
            url: self.url.clone(),
            authentication: authentication.to_string(),
            proxy_type: self.proxy_type.clone(),
            description: self.description.clone(),
            user: None,
            password: None,
            audience: None,
            token_service_url: None,
            key_store_location: None,
        }
    }

    fn subaccount<'a>(&'a self, details: &'a AssignmentDetails) -> &'a str {
        self.subaccount_id
            .as_deref()
            .unwrap_or(&details.formation.tenant.tenant_id)
    }
}

/// Objects are parsed; anything else carries no destinations.
fn parse(value: Option<&Value>) -> Result<Option<DestinationConfiguration>> {
    match value {
        Some(v) if v.is_object() => serde_json::from_value(v.clone())
            .map(Some)
            .context("configuration does not match the destination schema"),
        _ => Ok(None),
    }
}

pub async fn before_send(details: &AssignmentDetails, deps: &ServerDeps) -> Result<()> {
    match details.operation {
        AssignmentOperation::Unassign => teardown(details, deps).await,
        AssignmentOperation::Assign => create_basic_destinations(details, deps).await,
    }
}

async fn create_basic_destinations(details: &AssignmentDetails, deps: &ServerDeps) -> Result<()> {
    let Some(reverse) = &details.reverse else {
        return Ok(());
    };
    let Some(own) = parse(details.assignment.value.as_ref())? else {
        return Ok(());
    };
    let Some(peer) = parse(reverse.value.as_ref())? else {
        return Ok(());
    };

    let Some(basic) = own.credentials.inbound_communication.basic_authentication else {
        return Ok(());
    };
    let Some(creds) = peer.credentials.inbound_communication.basic_authentication else {
        return Ok(());
    };

    for spec in &basic.destinations {
        let mut input = spec.input(AUTH_BASIC);
        input.user = creds.username.clone();
        input.password = creds.password.clone();

        let subaccount = spec.subaccount(details);
        deps.destination_service
            .create_destination(subaccount, &input)
            .await
            .with_context(|| format!("while creating basic destination {}", spec.name))?;
        deps.store
            .save_destination_record(&DestinationRecord::new(
                &spec.name,
                details.assignment.id,
                DestinationKind::Basic,
                subaccount,
            ))
            .await?;
        info!(
            assignment_id = %details.assignment.id,
            destination = %spec.name,
            "Basic destination created"
        );
    }
    Ok(())
}

pub async fn after_status_returned(
    details: &AssignmentDetails,
    result: &mut NotificationResult,
    deps: &ServerDeps,
) -> Result<()> {
    if details.operation != AssignmentOperation::Assign
        || !matches!(
            result.state,
            AssignmentState::Ready | AssignmentState::ConfigPending
        )
    {
        return Ok(());
    }
    let Some(config) = parse(result.configuration.as_ref())? else {
        return Ok(());
    };

    for spec in &config.destinations {
        let input = spec.input(spec.authentication.as_deref().unwrap_or(AUTH_NONE));
        let subaccount = spec.subaccount(details);
        deps.destination_service
            .create_destination(subaccount, &input)
            .await
            .with_context(|| format!("while creating design time destination {}", spec.name))?;
        deps.store
            .save_destination_record(&DestinationRecord::new(
                &spec.name,
                details.assignment.id,
                DestinationKind::DesignTime,
                subaccount,
            ))
            .await?;
    }

    let saml = config
        .credentials
        .inbound_communication
        .saml_assertion
        .map(|s| s.destinations)
        .unwrap_or_default();

    let mut certificate_content = None;
    for spec in &saml {
        let subaccount = spec.subaccount(details);
        let certificate_name = format!("{}-cert", spec.name);
        let certificate = deps
            .destination_service
            .create_certificate(
                subaccount,
                &CertificateInput {
                    name: certificate_name.clone(),
                    file_type: "pem".to_string(),
                    common_name: spec.name.clone(),
                },
            )
            .await
            .with_context(|| format!("while creating certificate {}", certificate_name))?;

        let mut input = spec.input(AUTH_SAML);
        input.key_store_location = Some(certificate.name.clone());
        deps.destination_service
            .create_destination(subaccount, &input)
            .await
            .with_context(|| format!("while creating SAML assertion destination {}", spec.name))?;
        deps.store
            .save_destination_record(
                &DestinationRecord::new(
                    &spec.name,
                    details.assignment.id,
                    DestinationKind::SamlAssertion,
                    subaccount,
                )
                .with_certificate(&certificate.name),
            )
            .await?;
        certificate_content = Some(certificate.content);
    }

    if let Some(content) = certificate_content {
        inject_certificate(result, content);
    }

    info!(
        assignment_id = %details.assignment.id,
        design_time = config.destinations.len(),
        saml_assertion = saml.len(),
        "Destinations provisioned"
    );
    Ok(())
}

fn inject_certificate(result: &mut NotificationResult, content: String) {
    let Some(saml) = result
        .configuration
        .as_mut()
        .and_then(|c| c.pointer_mut("/credentials/inboundCommunication/samlAssertion"))
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    saml.insert("certificate".to_string(), Value::String(content));
}

async fn teardown(details: &AssignmentDetails, deps: &ServerDeps) -> Result<()> {
    let records = deps
        .store
        .list_destination_records(details.assignment.id)
        .await?;
    if records.is_empty() {
        return Ok(());
    }

    for record in &records {
        deps.destination_service
            .delete_destination(&record.subaccount, &record.name)
            .await
            .with_context(|| format!("while deleting destination {}", record.name))?;
        if let Some(certificate) = &record.certificate_name {
            deps.destination_service
                .delete_certificate(&record.subaccount, certificate)
                .await
                .with_context(|| format!("while deleting certificate {}", certificate))?;
        }
    }
    deps.store
        .delete_destination_records(details.assignment.id)
        .await?;

    info!(
        assignment_id = %details.assignment.id,
        count = records.len(),
        "Destinations deleted"
    );
    Ok(())
}
