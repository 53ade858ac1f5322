//! Total-order comparators over entries.
//!
//! Every replica holding the same entry set must derive the same order, so
//! each public strategy ends in a deterministic tie-break. The combinators
//! take the next comparator to consult when their own key is tied.

use std::cmp::Ordering;

use tidelog_types::LamportClock;

use crate::entry::Entry;

/// A comparator over two entries. `Greater` means `a` is more recent.
pub type SortFn = fn(&Entry, &Entry) -> Ordering;

/// Compare by clock time; on a tie, defer to `resolve`.
pub fn sort_by_clocks(a: &Entry, b: &Entry, resolve: SortFn) -> Ordering {
    match LamportClock::compare(&a.clock, &b.clock) {
        Ordering::Equal => resolve(a, b),
        ord => ord,
    }
}

/// Compare by clock id; on a tie, defer to `resolve`.
pub fn sort_by_clock_ids(a: &Entry, b: &Entry, resolve: SortFn) -> Ordering {
    match a.clock.id.cmp(&b.clock.id) {
        Ordering::Equal => resolve(a, b),
        ord => ord,
    }
}

/// Final tie-break of [`last_write_wins`]: the entries are treated as equal,
/// so a stable sort keeps whichever came first.
pub fn first_wins(_: &Entry, _: &Entry) -> Ordering {
    Ordering::Equal
}

/// Clock time, then clock id, then input order.
///
/// The default strategy of a [`Log`](crate::Log). Two distinct entries tie
/// when they share both time and clock id, which happens when replicas
/// writing under one identity fork. Their relative order then follows input
/// order, and a length-bounded load may keep either one depending on which
/// read finished first. Logs written that way should use
/// [`sort_by_entry_hash`].
pub fn last_write_wins(a: &Entry, b: &Entry) -> Ordering {
    sort_by_clocks(a, b, |a, b| sort_by_clock_ids(a, b, first_wins))
}

/// Clock time, then content address.
///
/// Unlike [`last_write_wins`] this never ties on distinct entries, even when
/// two writers share a clock id.
pub fn sort_by_entry_hash(a: &Entry, b: &Entry) -> Ordering {
    sort_by_clocks(a, b, |a, b| a.hash.cmp(&b.hash))
}
