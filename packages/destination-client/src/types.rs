use serde::{Deserialize, Serialize};

/// A destination as accepted by the destination service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationInput {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub destination_type: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Authentication")]
    pub authentication: String,
    #[serde(rename = "ProxyType")]
    pub proxy_type: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "User", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "Password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "audience", skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(rename = "tokenServiceURL", skip_serializing_if = "Option::is_none")]
    pub token_service_url: Option<String>,
    #[serde(rename = "KeyStoreLocation", skip_serializing_if = "Option::is_none")]
    pub key_store_location: Option<String>,
}

/// Request to issue a certificate for a SAML assertion destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateInput {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub file_type: String,
    #[serde(rename = "Common Name")]
    pub common_name: String,
}

/// Certificate material returned by the destination service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub file_type: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "CertificateChain", default)]
    pub certificate_chain: String,
}
