//! Provider selection: filter the catalog down to healthy, eligible
//! candidates, then rank them within their priority bucket by weighted
//! random draw.

use rand::Rng;
use waypoint_circuitbreaker::{Breaker, FuseTracker};
use waypoint_core::{
    CandidateSnapshot, DecisionContext, FilteredProvider, Provider, ProviderId, WireFormat,
};

use crate::weighted::{pick_weighted_index, probabilities};

/// Everything needed to rank one request's candidate providers.
pub struct SelectionRequest<'a> {
    pub wire_format: WireFormat,
    /// Intersection of the key's and user's provider groups.
    pub effective_groups: &'a [String],
    pub requested_model: &'a str,
    pub sticky_provider: Option<&'a ProviderId>,
}

/// Ordered selection result: `order[0]` is the pick, the rest are fallback
/// candidates for retries, already excluding filtered-out providers.
pub struct Selection {
    pub order: Vec<ProviderId>,
    pub decision: DecisionContext,
}

/// Health/eligibility services the selector consults read-only.
pub struct HealthGates<'a> {
    pub breaker: &'a Breaker,
    pub fuse: &'a FuseTracker,
}

fn group_matches(provider: &Provider, effective_groups: &[String]) -> bool {
    effective_groups.is_empty() || effective_groups.iter().any(|g| g == &provider.group_tag)
}

fn model_allowed(provider: &Provider, requested_model: &str) -> bool {
    provider.allowed_models.is_empty() || provider.allowed_models.iter().any(|m| m == requested_model)
}

/// Select and rank candidates for `request` out of `catalog`.
pub async fn select(
    catalog: &[Provider],
    request: &SelectionRequest<'_>,
    gates: &HealthGates<'_>,
    rng: &mut impl Rng,
) -> Selection {
    let total_providers = catalog.len();
    let mut decision = DecisionContext {
        total_providers,
        ..DecisionContext::default()
    };

    let mut candidates: Vec<&Provider> = Vec::new();
    for provider in catalog {
        if !provider.is_selectable() {
            decision.filtered_providers.push(FilteredProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                reason: "disabled".into(),
                details: None,
            });
            continue;
        }
        if !provider.provider_type.compatible_with(request.wire_format) {
            decision.filtered_providers.push(FilteredProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                reason: "wire_format_mismatch".into(),
                details: None,
            });
            continue;
        }
        if !group_matches(provider, request.effective_groups) {
            decision.filtered_providers.push(FilteredProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                reason: "group_mismatch".into(),
                details: None,
            });
            continue;
        }
        if !model_allowed(provider, request.requested_model) {
            decision.filtered_providers.push(FilteredProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                reason: "model_not_allowed".into(),
                details: None,
            });
            continue;
        }
        candidates.push(provider);
    }
    decision.enabled = candidates.len();

    let mut healthy: Vec<&Provider> = Vec::new();
    for provider in candidates {
        let vendor_key = provider.vendor_id.clone().unwrap_or_else(|| provider.id.as_str().to_string());
        let type_label = format!("{:?}", provider.provider_type);
        if gates.breaker.is_open(provider.id.as_str()).await {
            decision.filtered_providers.push(FilteredProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                reason: "circuit_open".into(),
                details: None,
            });
            continue;
        }
        if gates.fuse.is_open(&vendor_key, &type_label).await {
            decision.filtered_providers.push(FilteredProvider {
                id: provider.id.clone(),
                name: provider.name.clone(),
                reason: "circuit_open".into(),
                details: Some("vendor_type_fuse".into()),
            });
            continue;
        }
        healthy.push(provider);
    }
    decision.after_health_check = healthy.len();

    if healthy.is_empty() {
        return Selection {
            order: Vec::new(),
            decision,
        };
    }

    let mut buckets: Vec<(u8, Vec<&Provider>)> = Vec::new();
    for provider in healthy {
        let group = request.effective_groups.first().map_or(provider.group_tag.as_str(), |g| g.as_str());
        let priority = provider.priority_for_group(group);
        match buckets.iter_mut().find(|(p, _)| *p == priority) {
            Some((_, bucket)) => bucket.push(provider),
            None => buckets.push((priority, vec![provider])),
        }
    }
    buckets.sort_by_key(|(p, _)| *p);

    let mut order = Vec::new();
    for (priority, mut bucket) in buckets {
        bucket.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        if let Some(sticky_id) = request.sticky_provider {
            if let Some(pos) = bucket.iter().position(|p| &p.id == sticky_id) {
                let sticky = bucket.remove(pos);
                order.push(sticky.id.clone());
                record_bucket(&mut decision, priority, std::slice::from_ref(&sticky), Some(0));
                append_remaining_by_weight(&mut order, &mut decision, priority, bucket, rng);
                continue;
            }
        }

        append_remaining_by_weight(&mut order, &mut decision, priority, bucket, rng);
    }

    Selection { order, decision }
}

fn append_remaining_by_weight(
    order: &mut Vec<ProviderId>,
    decision: &mut DecisionContext,
    priority: u8,
    mut bucket: Vec<&Provider>,
    rng: &mut impl Rng,
) {
    if bucket.is_empty() {
        return;
    }
    let weights: Vec<f64> = bucket.iter().map(|p| p.weight).collect();
    record_bucket(decision, priority, &bucket, None);

    if let Some(winner_idx) = pick_weighted_index(&weights, rng) {
        let winner = bucket.remove(winner_idx);
        order.push(winner.id.clone());
    }
    bucket.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal).then(a.id.as_str().cmp(b.id.as_str())));
    order.extend(bucket.into_iter().map(|p| p.id.clone()));
}

fn record_bucket(decision: &mut DecisionContext, priority: u8, bucket: &[&Provider], _sticky_idx: Option<usize>) {
    if decision.selected_priority.is_none() {
        decision.selected_priority = Some(priority);
    }
    let weights: Vec<f64> = bucket.iter().map(|p| p.weight).collect();
    let probs = probabilities(&weights);
    for (provider, probability) in bucket.iter().zip(probs) {
        decision.candidates_at_priority.push(CandidateSnapshot {
            id: provider.id.clone(),
            name: provider.name.clone(),
            weight: provider.weight,
            cost_multiplier: provider.cost_multiplier,
            probability,
        });
    }
}
