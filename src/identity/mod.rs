//! Identity resolution
//!
//! Maps provider candidates onto canonical products. An external identifier
//! match always wins over a title match; a candidate matching neither creates
//! a new product.

use crate::providers::Candidate;
use crate::storage::{NewProduct, ProductRecord, Storage, StorageError};
use crate::TideError;

/// How a candidate was matched to its product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    MatchedByIdentifier,
    MatchedByTitle,
    Created,
}

impl MatchOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// A candidate's canonical product and how it was found
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub product: ProductRecord,
    pub outcome: MatchOutcome,
}

/// Display fields a candidate may contribute to an existing product
///
/// Only present, non-blank values are carried, so applying a patch never
/// clears a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub image_url: Option<String>,
}

impl ProductPatch {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            brand: non_blank(candidate.brand.as_deref()),
            model: non_blank(candidate.model.as_deref()),
            image_url: non_blank(candidate.image_url.as_deref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.brand.is_none() && self.model.is_none() && self.image_url.is_none()
    }

    /// Overwrites the product's fields with the patch values
    ///
    /// # Returns
    ///
    /// `true` if any field changed
    pub fn apply(&self, product: &mut ProductRecord) -> bool {
        let mut changed = false;
        for (incoming, field) in [
            (&self.brand, &mut product.brand),
            (&self.model, &mut product.model),
            (&self.image_url, &mut product.image_url),
        ] {
            if let Some(value) = incoming {
                if field.as_ref() != Some(value) {
                    *field = Some(value.clone());
                    changed = true;
                }
            }
        }
        changed
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves a candidate to a canonical product
///
/// 1. A usable identifier is looked up by (kind, value)
/// 2. Otherwise, or on a miss, the exact title is looked up
/// 3. Matches are patched with the candidate's display fields and saved
/// 4. With no match, a product is created and its identifier mapped
///
/// # Arguments
///
/// * `storage` - Product and identifier store
/// * `candidate` - The candidate to resolve
///
/// # Returns
///
/// * `Ok(Resolution)` - The product and how it was matched
/// * `Err(TideError)` - The candidate has no title, or storage failed
pub fn resolve<S>(storage: &mut S, candidate: &Candidate) -> Result<Resolution, TideError>
where
    S: Storage + ?Sized,
{
    let title = candidate.title.trim();
    if title.is_empty() {
        return Err(TideError::Provider {
            provider: candidate.source.clone(),
            message: "candidate has an empty title".to_string(),
        });
    }

    let patch = ProductPatch::from_candidate(candidate);
    let identifier = candidate.usable_identifier();

    if let Some(id) = identifier {
        if let Some(product) = storage.find_product_by_identifier(&id.kind, &id.value)? {
            let product = save_patch(storage, product, &patch)?;
            return Ok(Resolution {
                product,
                outcome: MatchOutcome::MatchedByIdentifier,
            });
        }
    }

    if let Some(product) = storage.find_product_by_title(title)? {
        let product = save_patch(storage, product, &patch)?;
        return Ok(Resolution {
            product,
            outcome: MatchOutcome::MatchedByTitle,
        });
    }

    let product = storage.insert_product(&NewProduct {
        title: title.to_string(),
        brand: patch.brand,
        model: patch.model,
        image_url: patch.image_url,
    })?;
    tracing::debug!("Created product {} for {:?}", product.id, product.title);

    if let Some(id) = identifier {
        match storage.insert_identifier(product.id, &id.kind, &id.value) {
            Ok(()) => {}
            Err(StorageError::IdentifierConflict { product_id, .. }) => {
                tracing::warn!(
                    "Identifier {}/{} already mapped to product {}, not remapping to {}",
                    id.kind,
                    id.value,
                    product_id,
                    product.id
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Resolution {
        product,
        outcome: MatchOutcome::Created,
    })
}

fn save_patch<S>(
    storage: &mut S,
    mut product: ProductRecord,
    patch: &ProductPatch,
) -> Result<ProductRecord, TideError>
where
    S: Storage + ?Sized,
{
    if patch.apply(&mut product) {
        Ok(storage.update_product(&product)?)
    } else {
        Ok(product)
    }
}
