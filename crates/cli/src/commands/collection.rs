//! Cart, wishlist and save-for-later actions.

use clap::Subcommand;
use rust_decimal::Decimal;
use yoraa_core::{CollectionKind, ItemId, LineItem, LineItemDraft, VariantKey};
use yoraa_store::{AddOutcome, Collections, ServiceDeps, SortCriterion, selectors};

use super::CliError;
use crate::output::{self, Format};

#[derive(Subcommand)]
pub enum CollectionAction {
    /// Show items (and totals for the cart)
    List {
        /// Display order (name, price-asc, price-desc, date-asc, date-desc); not saved
        #[arg(long)]
        sort: Option<SortCriterion>,

        /// Only items whose name contains this text
        #[arg(long)]
        search: Option<String>,

        /// Only items in this size
        #[arg(long)]
        size: Option<String>,

        /// Only items in this color
        #[arg(long)]
        color: Option<String>,
    },
    /// Add an item
    Add {
        /// Catalog item ID
        id: String,

        /// Unit price
        #[arg(short, long)]
        price: Decimal,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Units to add (cart only; defaults to 1)
        #[arg(short, long)]
        quantity: Option<u32>,

        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        color: Option<String>,

        /// Free-text note
        #[arg(long)]
        note: Option<String>,
    },
    /// Remove an item; with --size/--color only that variant
    Remove {
        id: String,

        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },
    /// Set a cart item's quantity (0 or less removes it)
    Update {
        id: String,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove everything
    Clear,
    /// Reorder and save (name, price-asc, price-desc, date-asc, date-desc)
    Sort { by: SortCriterion },
    /// Move an item into the cart
    MoveToCart { id: String },
    /// Move an item into the wishlist
    MoveToWishlist { id: String },
}

/// Run one action against a collection.
///
/// # Errors
///
/// Returns an error if loading the collection or the action itself fails.
pub async fn run(
    deps: &ServiceDeps,
    kind: CollectionKind,
    action: CollectionAction,
    format: Format,
) -> Result<(), CliError> {
    let mut collections = Collections::new(deps);
    collections.get_mut(kind).hydrate().await?;

    match action {
        CollectionAction::List {
            sort,
            search,
            size,
            color,
        } => {
            let mut view = collections.get(kind).store().clone();
            if let Some(criterion) = sort {
                view.sort(criterion);
            }

            if search.is_none() && size.is_none() && color.is_none() {
                let summary = selectors::summary(&view);
                return match format {
                    Format::Json => Ok(output::json(&summary)?),
                    Format::Text => {
                        output::summary(&summary);
                        Ok(())
                    }
                };
            }

            let mut rows: Vec<&LineItem> = view.items().iter().collect();
            if let Some(query) = search.as_deref() {
                let hits = selectors::search(&view, query);
                rows.retain(|item| hits.iter().any(|hit| std::ptr::eq(*hit, *item)));
            }
            if let Some(size) = size.as_deref() {
                let hits = selectors::filter_by_size(&view, size);
                rows.retain(|item| hits.iter().any(|hit| std::ptr::eq(*hit, *item)));
            }
            if let Some(color) = color.as_deref() {
                let hits = selectors::filter_by_color(&view, color);
                rows.retain(|item| hits.iter().any(|hit| std::ptr::eq(*hit, *item)));
            }

            match format {
                Format::Json => output::json(&rows)?,
                Format::Text => output::items(&rows),
            }
            Ok(())
        }

        CollectionAction::Add {
            id,
            price,
            name,
            quantity,
            size,
            color,
            note,
        } => {
            let mut draft = LineItemDraft::new(id, price);
            if let Some(name) = name {
                draft = draft.with_name(name);
            }
            if let Some(quantity) = quantity {
                draft = draft.with_quantity(quantity);
            }
            if let Some(size) = size {
                draft = draft.with_size(size);
            }
            if let Some(color) = color {
                draft = draft.with_color(color);
            }
            if let Some(note) = note {
                draft = draft.with_note(note);
            }

            let service = collections.get_mut(kind);
            let outcome = service.add(draft).await?;
            let text = match outcome {
                AddOutcome::Inserted => format!("Added to {kind}"),
                AddOutcome::Merged => format!("Increased quantity in {kind}"),
                AddOutcome::Unchanged => format!("Already in {kind}"),
            };
            finish(&collections, kind, format, &text)
        }

        CollectionAction::Remove { id, size, color } => {
            let service = collections.get_mut(kind);
            let text = if size.is_some() || color.is_some() {
                let key = VariantKey::new(id.as_str(), size.as_deref(), color.as_deref());
                if service.remove_variant(&key).await? {
                    "Removed variant".to_string()
                } else {
                    "No matching variant".to_string()
                }
            } else {
                let removed = service.remove(&ItemId::new(id)).await?;
                format!("Removed {removed} entries")
            };
            finish(&collections, kind, format, &text)
        }

        CollectionAction::Update { id, quantity } => {
            let changed = collections
                .get_mut(kind)
                .update_quantity(&ItemId::new(id), quantity)
                .await?;
            let text = if changed { "Updated" } else { "Nothing to update" };
            finish(&collections, kind, format, text)
        }

        CollectionAction::Clear => {
            collections.get_mut(kind).clear().await?;
            finish(&collections, kind, format, &format!("Cleared {kind}"))
        }

        CollectionAction::Sort { by } => {
            collections.get_mut(kind).sort(by);
            finish(&collections, kind, format, "Sorted")
        }

        CollectionAction::MoveToCart { id } => {
            move_item(&mut collections, kind, CollectionKind::Cart, &id, format).await
        }

        CollectionAction::MoveToWishlist { id } => {
            move_item(&mut collections, kind, CollectionKind::Wishlist, &id, format).await
        }
    }
}

async fn move_item(
    collections: &mut Collections,
    from: CollectionKind,
    to: CollectionKind,
    id: &str,
    format: Format,
) -> Result<(), CliError> {
    collections.get_mut(to).hydrate().await?;
    let moved = collections.move_item(from, to, &ItemId::new(id)).await?;
    finish(
        collections,
        to,
        format,
        &format!("Moved {} entries to {to}", moved.len()),
    )
}

/// Print the outcome line followed by the collection's new state.
fn finish(
    collections: &Collections,
    kind: CollectionKind,
    format: Format,
    text: &str,
) -> Result<(), CliError> {
    let summary = selectors::summary(collections.get(kind).store());
    match format {
        Format::Json => output::json(&summary)?,
        Format::Text => {
            output::message(format, text);
            output::summary(&summary);
        }
    }
    Ok(())
}
