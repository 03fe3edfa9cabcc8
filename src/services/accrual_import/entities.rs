//! Tenant and space upserts by natural key.
//!
//! Spaces follow fill-if-empty merge: a stored value is only replaced when
//! it is empty or one of the placeholders the importer itself generates.

use anyhow::Result;
use tracing::debug;

use crate::types::{LegalFormHint, MarketSpace, NewMarketSpace, NewTenant, SpacePatch, SpaceStatus};

use super::context::RunContext;
use super::locations::ResolvedLocation;
use super::store::StoreTx;
use super::text::fold;

const COMPANY_MARKERS: &[&str] = &[
    "ооо", "оао", "зао", "пао", "ао", "нао", "llc", "ltd", "inc", "gmbh", "corp",
];
const PARTNERSHIP_MARKERS: &[&str] = &["тов", "товарищество", "partnership", "lp", "llp"];
const SOLE_TRADER_MARKERS: &[&str] = &["ип", "пбоюл"];

const COMPANY_PHRASES: &[&str] = &[
    "общество с ограниченной ответственностью",
    "акционерное общество",
];
const SOLE_TRADER_PHRASES: &[&str] = &["индивидуальный предприниматель"];

const PLACEHOLDER_NAMES: &[&str] = &["", "-", "\u{2014}", "без названия"];

/// Guess the legal form from keywords in a tenant name
pub fn legal_form_hint(name: &str) -> Option<LegalFormHint> {
    let folded = fold(name);
    let tokens: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has_token = |markers: &[&str]| tokens.iter().any(|t| markers.contains(t));
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|p| folded.contains(p));

    if has_token(SOLE_TRADER_MARKERS) || has_phrase(SOLE_TRADER_PHRASES) {
        Some(LegalFormHint::SoleTrader)
    } else if has_token(COMPANY_MARKERS) || has_phrase(COMPANY_PHRASES) {
        Some(LegalFormHint::Company)
    } else if has_token(PARTNERSHIP_MARKERS) {
        Some(LegalFormHint::Partnership)
    } else {
        None
    }
}

/// Generated display name for a space with no name in the file
pub fn default_display_name(place_code: &str) -> String {
    format!("Место {}", place_code)
}

/// True when `name` may be overwritten by imported data
pub fn is_placeholder_name(name: Option<&str>, place_code: &str) -> bool {
    let folded = fold(name.unwrap_or(""));
    PLACEHOLDER_NAMES.contains(&folded.as_str()) || folded == fold(&default_display_name(place_code))
}

/// Resolve a tenant by exact name, creating it on first sight
pub async fn resolve_tenant<T: StoreTx>(tx: &mut T, ctx: &mut RunContext, name: &str) -> Result<i64> {
    if let Some(&id) = ctx.tenants.get(name) {
        return Ok(id);
    }

    let id = match tx.find_tenant(ctx.market_id, name).await? {
        Some(existing) => existing.id,
        None => {
            let created = tx
                .create_tenant(&NewTenant {
                    market_id: ctx.market_id,
                    name: name.to_string(),
                    legal_form_hint: legal_form_hint(name),
                })
                .await?;
            ctx.stats.tenants_created += 1;
            debug!("Created tenant '{}' ({:?})", created.name, created.legal_form_hint);
            created.id
        }
    };

    ctx.tenants.insert(name.to_string(), id);
    Ok(id)
}

/// Row values relevant to a space
#[derive(Debug, Clone)]
pub struct SpaceTouch<'a> {
    pub place_code: &'a str,
    pub place_name: &'a str,
    pub activity_type: &'a str,
    pub area: f64,
    pub is_leased: bool,
    pub location: Option<&'a ResolvedLocation>,
    /// Set only for occupied rows with a resolved tenant
    pub tenant_id: Option<i64>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn count_status(ctx: &mut RunContext, status: SpaceStatus) {
    match status {
        SpaceStatus::Occupied => ctx.stats.spaces_marked_occupied += 1,
        SpaceStatus::Free => ctx.stats.spaces_marked_free += 1,
    }
}

/// Fill-if-empty patch for an existing space
fn merge_patch(ctx: &RunContext, space: &MarketSpace, touch: &SpaceTouch<'_>, status: SpaceStatus) -> SpacePatch {
    let caps = ctx.capabilities;
    let mut patch = SpacePatch::default();

    if touch.area > 0.0 && space.area.map_or(true, |a| a <= 0.0) {
        patch.area = Some(touch.area);
    }
    if !touch.place_name.is_empty()
        && space.display_name.as_deref() != Some(touch.place_name)
        && is_placeholder_name(space.display_name.as_deref(), touch.place_code)
    {
        patch.display_name = Some(touch.place_name.to_string());
    }
    if caps.space_activity_type
        && !touch.activity_type.is_empty()
        && space.activity_type.as_deref().map_or(true, str::is_empty)
    {
        patch.activity_type = Some(touch.activity_type.to_string());
    }
    if caps.locations && space.location_id.is_none() {
        patch.location_id = touch.location.map(|l| l.location_id);
    }
    if space.status != status {
        patch.status = Some(status);
    }
    if ctx.link_tenants && caps.space_tenant_link && touch.is_leased {
        if let Some(tenant_id) = touch.tenant_id {
            if space.tenant_id != Some(tenant_id) {
                patch.tenant_id = Some(tenant_id);
            }
        }
    }

    patch
}

/// Resolve or create the space for a row and merge the row into it
pub async fn touch_space<T: StoreTx>(
    tx: &mut T,
    ctx: &mut RunContext,
    touch: &SpaceTouch<'_>,
) -> Result<MarketSpace> {
    let code = touch.place_code;
    let status = ctx.occupancy.record(code, touch.is_leased);
    let caps = ctx.capabilities;

    let cached = match ctx.space_ids.get(code).and_then(|id| ctx.spaces.get(id)) {
        Some(space) => Some(space.clone()),
        None => match tx.find_space(ctx.market_id, code).await? {
            // another code of this space was touched earlier in the run
            Some(found) => Some(ctx.spaces.get(&found.id).cloned().unwrap_or(found)),
            None => None,
        },
    };

    let mut space = match cached {
        Some(space) => space,
        None => {
            let display_name = non_empty(touch.place_name).unwrap_or_else(|| default_display_name(code));
            let created = tx
                .create_space(&NewMarketSpace {
                    market_id: ctx.market_id,
                    code: code.to_string(),
                    area: (touch.area > 0.0).then_some(touch.area),
                    status,
                    display_name,
                    activity_type: non_empty(touch.activity_type).filter(|_| caps.space_activity_type),
                    location_id: touch.location.filter(|_| caps.locations).map(|l| l.location_id),
                })
                .await?;
            ctx.stats.spaces_created += 1;
            count_status(ctx, status);
            debug!("Created space '{}' ({})", code, status.as_str());
            created
        }
    };

    if caps.locations && touch.location.is_some() {
        ctx.stats.location_assignments_attempted += 1;
    }

    let patch = merge_patch(ctx, &space, touch, status);
    if let Some(new_status) = patch.status {
        count_status(ctx, new_status);
    }
    if !patch.is_empty() {
        tx.update_space(space.id, &patch).await?;
        patch.apply_to(&mut space);
    }

    ctx.space_ids.insert(code.to_string(), space.id);
    ctx.spaces.insert(space.id, space.clone());
    Ok(space)
}
