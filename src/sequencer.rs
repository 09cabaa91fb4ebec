//! Loading order for multi-stop deliveries.
//!
//! Stops visited last are loaded first so they end up deepest in the vehicle,
//! and the items of the first stop stay reachable at the door.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::config::UnlabeledPolicy;
use crate::model::Item;
use crate::types::Dimensional;

/// An item with its position in the unloading sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencedItem {
    pub item: Item,
    /// 0 is unloaded first.
    pub unload_rank: usize,
    /// Position in the request after quantity expansion.
    pub input_index: usize,
}

/// Order in which the stops of `items` are visited.
///
/// Labels listed in `route` come first, in route order; the remaining labels
/// follow lexicographically.
pub fn visit_order(items: &[Item], route: Option<&[String]>) -> Vec<String> {
    let present: BTreeSet<&str> = items
        .iter()
        .filter_map(|item| item.destination.as_deref())
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(present.len());
    for label in route.unwrap_or_default() {
        if present.contains(label.as_str()) && !order.contains(label) {
            order.push(label.clone());
        }
    }
    for label in present {
        if !order.iter().any(|known| known == label) {
            order.push(label.to_string());
        }
    }
    order
}

/// Unload rank of every stop, plus the rank of unlabeled items.
fn ranks(visits: &[String], policy: UnlabeledPolicy) -> (Vec<(String, usize)>, usize) {
    let offset = match policy {
        UnlabeledPolicy::LoadLast => 1,
        UnlabeledPolicy::LoadFirst => 0,
    };
    let labeled = visits
        .iter()
        .enumerate()
        .map(|(idx, label)| (label.clone(), idx + offset))
        .collect();
    let unlabeled = match policy {
        UnlabeledPolicy::LoadLast => 0,
        UnlabeledPolicy::LoadFirst => visits.len(),
    };
    (labeled, unlabeled)
}

/// Orders items for loading.
///
/// Descending unload rank first; inside a group larger, then heavier items
/// go first, and input order settles the rest.
///
/// # Parameters
/// * `items` - Expanded, valid items in request order
/// * `route` - Optional explicit stop order, first visited first
/// * `policy` - Placement of the unlabeled group
pub fn sequence(
    items: Vec<Item>,
    route: Option<&[String]>,
    policy: UnlabeledPolicy,
) -> Vec<SequencedItem> {
    let visits = visit_order(&items, route);
    let (labeled, unlabeled_rank) = ranks(&visits, policy);
    let rank_of = |item: &Item| -> usize {
        match &item.destination {
            Some(label) => labeled
                .iter()
                .find(|(known, _)| known == label)
                .map(|(_, rank)| *rank)
                .unwrap_or(unlabeled_rank),
            None => unlabeled_rank,
        }
    };

    let mut sequenced: Vec<SequencedItem> = items
        .into_iter()
        .enumerate()
        .map(|(input_index, item)| SequencedItem {
            unload_rank: rank_of(&item),
            item,
            input_index,
        })
        .collect();

    sequenced.sort_by(|a, b| {
        b.unload_rank
            .cmp(&a.unload_rank)
            .then_with(|| group_priority(&a.item, &b.item))
            .then_with(|| a.input_index.cmp(&b.input_index))
    });
    sequenced
}

/// Compares two items by loading priority inside one group.
pub fn group_priority(a: &Item, b: &Item) -> Ordering {
    b.volume()
        .total_cmp(&a.volume())
        .then_with(|| b.weight.total_cmp(&a.weight))
}
