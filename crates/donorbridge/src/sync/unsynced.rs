//! Selection of unsynced donations.
//!
//! The source knows nothing about the log. A donation is unsynced when the
//! source reports it completed and the log's synced set does not contain it.
//! Both are read fresh on every call, so a resumed batch never re-sends a
//! donation that succeeded in the meantime.

use std::collections::BTreeSet;

use crate::source::{Donation, DonationId, DonationSource, Result};

use super::types::UNSYNCED_PAGE_SIZE;

/// Up to `limit` unsynced donations with id > `after`, ascending by id.
pub(crate) async fn select<S: DonationSource + ?Sized>(
    source: &S,
    synced: &BTreeSet<DonationId>,
    after: Option<DonationId>,
    limit: u64,
) -> Result<Vec<Donation>> {
    let mut selected = Vec::new();
    let mut cursor = after;
    let wanted = usize::try_from(limit).unwrap_or(usize::MAX);

    while selected.len() < wanted {
        let page = source.fetch_completed(cursor, UNSYNCED_PAGE_SIZE).await?;
        let exhausted = (page.len() as u64) < UNSYNCED_PAGE_SIZE;
        cursor = page.last().map(|d| d.id).or(cursor);

        let room = wanted - selected.len();
        selected.extend(
            page.into_iter()
                .filter(|d| !synced.contains(&d.id))
                .take(room),
        );

        if exhausted {
            break;
        }
    }

    Ok(selected)
}

/// Unsynced counts from one pass over the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub total: u64,
    /// Those with id > the cursor.
    pub beyond_cursor: u64,
}

/// Count unsynced donations, overall and beyond `cursor`, in a single scan.
pub(crate) async fn tally<S: DonationSource + ?Sized>(
    source: &S,
    synced: &BTreeSet<DonationId>,
    cursor: Option<DonationId>,
) -> Result<Tally> {
    let mut tally = Tally::default();
    let mut after = None;

    loop {
        let page = source.fetch_completed(after, UNSYNCED_PAGE_SIZE).await?;
        let exhausted = (page.len() as u64) < UNSYNCED_PAGE_SIZE;
        after = page.last().map(|d| d.id).or(after);

        for donation in page.iter().filter(|d| !synced.contains(&d.id)) {
            tally.total += 1;
            if cursor.is_none_or(|c| donation.id > c) {
                tally.beyond_cursor += 1;
            }
        }

        if exhausted {
            return Ok(tally);
        }
    }
}

/// Number of unsynced donations.
pub(crate) async fn count<S: DonationSource + ?Sized>(
    source: &S,
    synced: &BTreeSet<DonationId>,
) -> Result<u64> {
    Ok(tally(source, synced, None).await?.total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DonationStatus, InMemorySource};
    use crate::testing::DonationBuilder;

    fn source(ids: impl IntoIterator<Item = DonationId>) -> InMemorySource {
        InMemorySource::with_donations(ids.into_iter().map(|id| DonationBuilder::single(id).build()))
    }

    #[tokio::test]
    async fn select_excludes_synced_and_respects_cursor() {
        let source = source(1..=10);
        let synced = BTreeSet::from([2, 3, 7]);

        let first = select(&source, &synced, None, 3).await.unwrap();
        assert_eq!(first.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 4, 5]);

        let next = select(&source, &synced, Some(5), 3).await.unwrap();
        assert_eq!(next.iter().map(|d| d.id).collect::<Vec<_>>(), vec![6, 8, 9]);

        assert_eq!(count(&source, &synced).await.unwrap(), 7);
        assert_eq!(
            tally(&source, &synced, Some(5)).await.unwrap(),
            Tally {
                total: 7,
                beyond_cursor: 4
            }
        );
    }

    #[tokio::test]
    async fn select_pages_past_fully_synced_pages() {
        let source = source(1..=250);
        let synced: BTreeSet<DonationId> = (1..=230).collect();

        let selected = select(&source, &synced, None, 5).await.unwrap();
        assert_eq!(
            selected.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![231, 232, 233, 234, 235]
        );
        assert_eq!(count(&source, &synced).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn incomplete_donations_are_never_selected() {
        let source = InMemorySource::with_donations([
            DonationBuilder::single(1).status(DonationStatus::Pending).build(),
            DonationBuilder::single(2).build(),
        ]);

        let selected = select(&source, &BTreeSet::new(), None, 10).await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, 2);
    }

    #[tokio::test]
    async fn tally_scans_the_source_once() {
        let source = crate::testing::FlakySource::new(source(1..=250));
        let synced = BTreeSet::from([1, 2, 240]);

        let counts = tally(&source, &synced, Some(200)).await.unwrap();

        assert_eq!(counts.total, 247);
        assert_eq!(counts.beyond_cursor, 49);
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn zero_limit_selects_nothing() {
        let source = source(1..=3);
        assert!(select(&source, &BTreeSet::new(), None, 0).await.unwrap().is_empty());
    }
}
