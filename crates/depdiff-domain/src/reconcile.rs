use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::lockfile::{ManifestSnapshot, PackageDescriptor};

/// Which of the two compared revisions a package tree belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Old,
    New,
}

impl Side {
    pub fn dir_name(self) -> &'static str {
        match self {
            Side::Old => "old",
            Side::New => "new",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageChange {
    Added,
    Removed,
    Changed,
    Unchanged,
}

/// A package that needs materializing on at least one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledPackage {
    pub name: String,
    pub old: Option<PackageDescriptor>,
    pub new: Option<PackageDescriptor>,
}

impl ScheduledPackage {
    pub fn change(&self) -> PackageChange {
        match (&self.old, &self.new) {
            (None, Some(_)) => PackageChange::Added,
            (Some(_), None) => PackageChange::Removed,
            (Some(old), Some(new)) if old == new => PackageChange::Unchanged,
            _ => PackageChange::Changed,
        }
    }

    pub fn side(&self, side: Side) -> Option<&PackageDescriptor> {
        match side {
            Side::Old => self.old.as_ref(),
            Side::New => self.new.as_ref(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Sorted by package name.
    pub scheduled: Vec<ScheduledPackage>,
    /// Names present and identical on both sides that were left out.
    pub skipped: Vec<String>,
}

impl ReconciliationPlan {
    /// Every (side, descriptor) pair that must be fetched.
    pub fn jobs(&self) -> impl Iterator<Item = (Side, &PackageDescriptor)> + '_ {
        self.scheduled.iter().flat_map(|package| {
            [Side::Old, Side::New]
                .into_iter()
                .filter_map(move |side| package.side(side).map(|descriptor| (side, descriptor)))
        })
    }

    pub fn job_count(&self) -> usize {
        self.jobs().count()
    }

    pub fn names_for(&self, side: Side) -> BTreeSet<&str> {
        self.scheduled
            .iter()
            .filter(|package| package.side(side).is_some())
            .map(|package| package.name.as_str())
            .collect()
    }
}

/// Decide which packages to fetch on each side.
///
/// Every name from either snapshot is scheduled on the sides it appears on,
/// except that with `skip_unchanged` a name with identical descriptors on both
/// sides is dropped entirely.
pub fn reconcile(
    old: &ManifestSnapshot,
    new: &ManifestSnapshot,
    skip_unchanged: bool,
) -> ReconciliationPlan {
    let names: BTreeSet<&String> = old.packages.keys().chain(new.packages.keys()).collect();
    let mut plan = ReconciliationPlan::default();

    for name in names {
        let before = old.get(name);
        let after = new.get(name);
        if skip_unchanged {
            if let (Some(before), Some(after)) = (before, after) {
                if before == after {
                    tracing::info!(package = %name, "skipping unchanged package");
                    plan.skipped.push(name.clone());
                    continue;
                }
            }
        }
        plan.scheduled.push(ScheduledPackage {
            name: name.clone(),
            old: before.cloned(),
            new: after.cloned(),
        });
    }

    plan
}
