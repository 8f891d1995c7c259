use std::sync::Arc;

use tracing::debug;

use super::normalize::{name_similarity, normalize_name};
use super::{
    merge_candidates, select, similarity_score, ResolutionSettings, EMAIL_DOMAIN_SCORE,
    EXACT_CODE_SCORE, NORMALIZED_NAME_SCORE,
};
use crate::domain::analysis::CustomerResolution;
use crate::domain::customer::{email_domain, Customer, CustomerCandidate};
use crate::ports::{CustomerRegistry, ExternalError};

/// Mailbox providers whose domain says nothing about the sender's company.
const SHARED_MAIL_DOMAINS: &[&str] = &[
    "gmail.com", "googlemail.com", "hotmail.com", "hotmail.fr", "outlook.com", "outlook.fr",
    "live.fr", "live.com", "yahoo.com", "yahoo.fr", "orange.fr", "wanadoo.fr", "free.fr",
    "laposte.net", "sfr.fr", "icloud.com",
];

pub struct CustomerResolver {
    registry: Arc<dyn CustomerRegistry>,
    settings: ResolutionSettings,
}

impl CustomerResolver {
    pub fn new(registry: Arc<dyn CustomerRegistry>, settings: ResolutionSettings) -> Self {
        Self { registry, settings }
    }

    pub async fn resolve(
        &self,
        name_guess: Option<&str>,
        email_guess: Option<&str>,
    ) -> Result<CustomerResolution, ExternalError> {
        let candidates = self.candidates(name_guess, email_guess).await?;
        if name_guess.is_none() && candidates.is_empty() {
            return Ok(CustomerResolution {
                candidates,
                selected: None,
                requires_user_choice: true,
                reason: "no customer mentioned in the request".to_string(),
            });
        }

        let selection = select(&candidates, self.settings.auto_validation);
        Ok(CustomerResolution {
            candidates,
            selected: selection.selected,
            requires_user_choice: selection.requires_user_choice,
            reason: selection.reason,
        })
    }

    /// Ranked candidates from every available signal.
    pub async fn candidates(
        &self,
        name_guess: Option<&str>,
        email_guess: Option<&str>,
    ) -> Result<Vec<CustomerCandidate>, ExternalError> {
        let name = name_guess.map(str::trim).filter(|name| !name.is_empty());
        let domain = email_guess
            .and_then(email_domain)
            .filter(|domain| !SHARED_MAIL_DOMAINS.contains(&domain.as_str()));

        let (by_code, by_name, by_domain) = tokio::try_join!(
            self.exact_code(name),
            self.name_search(name),
            self.domain_search(domain.as_deref()),
        )?;

        let mut signals = Vec::new();
        signals.extend(by_code);
        signals.extend(by_name);
        signals.extend(by_domain);

        let ranked = merge_candidates(signals, self.settings.max_candidates);
        debug!(
            event_name = "resolution.customer.ranked",
            candidate_count = ranked.len(),
            top_score = ranked.first().map(|candidate| candidate.score).unwrap_or(0),
            "customer candidates ranked"
        );
        Ok(ranked)
    }

    async fn exact_code(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<CustomerCandidate>, ExternalError> {
        let Some(code) = name.filter(|name| looks_like_code(name)) else {
            return Ok(Vec::new());
        };
        let found = self.registry.find_by_code(code).await?;
        Ok(found
            .into_iter()
            .map(|customer| {
                candidate(customer, EXACT_CODE_SCORE, "exact customer code".to_string())
            })
            .collect())
    }

    async fn name_search(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<CustomerCandidate>, ExternalError> {
        let Some(name) = name else {
            return Ok(Vec::new());
        };
        let wanted = normalize_name(name);
        let matches = self.registry.search_by_name(name, self.settings.search_limit).await?;

        Ok(matches
            .into_iter()
            .map(|customer| {
                let found = normalize_name(&customer.name);
                if found == wanted {
                    candidate(customer, NORMALIZED_NAME_SCORE, "normalized name match".to_string())
                } else {
                    let similarity = name_similarity(&wanted, &found);
                    candidate(
                        customer,
                        similarity_score(similarity),
                        format!("name similarity {similarity:.2}"),
                    )
                }
            })
            .collect())
    }

    async fn domain_search(
        &self,
        domain: Option<&str>,
    ) -> Result<Vec<CustomerCandidate>, ExternalError> {
        let Some(domain) = domain else {
            return Ok(Vec::new());
        };
        let matches = self.registry.find_by_email_domain(domain).await?;
        Ok(matches
            .into_iter()
            .map(|customer| {
                candidate(customer, EMAIL_DOMAIN_SCORE, format!("sender email domain {domain}"))
            })
            .collect())
    }
}

fn looks_like_code(name: &str) -> bool {
    !name.contains(char::is_whitespace) && name.chars().any(|c| c.is_ascii_digit())
}

fn candidate(customer: Customer, score: u8, reason: String) -> CustomerCandidate {
    CustomerCandidate {
        external_code: customer.code,
        display_name: customer.name,
        score,
        match_reason: reason,
        price_tier: customer.price_tier,
    }
}
