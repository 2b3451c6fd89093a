//! Tenant-specific answer material: service price list and business info

use super::intent::InstitutionalTopic;
use serde::{Deserialize, Serialize};

const MAX_LISTED_SERVICES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOffer {
    pub name: String,
    /// Price in BRL
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    #[serde(default)]
    pub services: Vec<ServiceOffer>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub cancellation_policy: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl TenantProfile {
    pub fn with_service(mut self, name: impl Into<String>, price: f64) -> Self {
        self.services.push(ServiceOffer {
            name: name.into(),
            price,
        });
        self
    }

    /// Price list limited to the first five services
    pub fn pricing_response(&self) -> String {
        if self.services.is_empty() {
            return "Entre em contato para informações sobre preços.".to_string();
        }

        let mut response = String::from("💰 Nossos preços:\n\n");
        for service in self.services.iter().take(MAX_LISTED_SERVICES) {
            response.push_str(&format!("• {}: R$ {:.2}\n", service.name, service.price));
        }
        response
    }

    pub fn institutional_response(&self, topic: &InstitutionalTopic) -> String {
        let configured = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        match topic {
            InstitutionalTopic::Address => {
                configured(&self.address, "Consulte nosso site para endereço.")
            }
            InstitutionalTopic::Hours => configured(&self.hours, "Segunda a sexta, 8h às 18h."),
            InstitutionalTopic::Policy => configured(
                &self.cancellation_policy,
                "Cancelamentos com 24h de antecedência.",
            ),
            InstitutionalTopic::Payment => "Aceitamos dinheiro, cartão e PIX.".to_string(),
            InstitutionalTopic::Contact => {
                configured(&self.phone, "Entre em contato pelo WhatsApp.")
            }
            InstitutionalTopic::Other(_) => "Informação não disponível no momento.".to_string(),
        }
    }
}
