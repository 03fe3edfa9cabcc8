//! Location hierarchy resolution: one location type and one root location
//! per distinct "location type" context value.

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::context::RunContext;
use super::store::StoreTx;
use super::text::{clean, fold};

const CODE_FALLBACK_PREFIX: &str = "loc-";
const CODE_HASH_CHARS: usize = 12;

/// Location type and its root location, cached per run by code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub location_type_id: i64,
    pub location_id: i64,
    pub code: String,
}

/// Latin spelling of a lowercase Cyrillic letter
fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' | 'ґ' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'є' => "ye",
        'ж' => "zh",
        'з' => "z",
        'и' | 'і' => "i",
        'ї' => "yi",
        'й' | 'ы' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(latin)
}

/// URL-safe ASCII slug of a folded name. Returns `None` when a letter
/// has no Latin spelling, so distinct names never collapse into one slug.
fn slugify(folded: &str) -> Option<String> {
    let mut latin = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii() {
            latin.push(c);
        } else if let Some(t) = transliterate(c) {
            latin.push_str(t);
        } else if c.is_alphanumeric() {
            return None;
        } else if c.is_whitespace() {
            latin.push(' ');
        }
    }

    let mut slug = String::with_capacity(latin.len());
    let mut pending_dash = false;
    for c in latin.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '-' || c.is_whitespace() {
            pending_dash = true;
        }
    }

    let slug = slug.trim_matches(|c| c == '-' || c == '_').to_string();
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Stable code for a location type name
pub fn location_code(name: &str) -> String {
    let folded = fold(name);
    if let Some(slug) = slugify(&folded) {
        return slug;
    }

    let digest = hex::encode(Sha256::digest(folded.as_bytes()));
    format!("{}{}", CODE_FALLBACK_PREFIX, &digest[..CODE_HASH_CHARS])
}

/// Resolve (or create) the location type and root location for `raw_name`.
/// Returns `None` for a blank name.
pub async fn resolve_location<T: StoreTx>(
    tx: &mut T,
    ctx: &mut RunContext,
    raw_name: &str,
) -> Result<Option<ResolvedLocation>> {
    let name = clean(raw_name);
    if name.is_empty() {
        return Ok(None);
    }

    let code = location_code(&name);
    if let Some(cached) = ctx.locations.get(&code) {
        return Ok(Some(cached.clone()));
    }

    let location_type = match tx.find_location_type(ctx.market_id, &code).await? {
        Some(existing) => {
            if existing.name != name {
                tx.rename_location_type(existing.id, &name).await?;
            }
            existing
        }
        None => {
            let created = tx.create_location_type(ctx.market_id, &code, &name).await?;
            ctx.stats.location_types_created += 1;
            debug!("Created location type '{}' ({})", name, code);
            created
        }
    };

    let location = match tx.find_location(ctx.market_id, &code).await? {
        Some(existing) => existing,
        None => {
            let created = tx
                .create_location(ctx.market_id, location_type.id, &code, &name)
                .await?;
            ctx.stats.locations_created += 1;
            debug!("Created location '{}' ({})", name, code);
            created
        }
    };

    let resolved = ResolvedLocation {
        location_type_id: location_type.id,
        location_id: location.id,
        code: code.clone(),
    };
    ctx.locations.insert(code, resolved.clone());
    Ok(Some(resolved))
}
