//! # UTXO Keeper
//!
//! Owns every live reservation. A build that wants to spend funds asks the
//! keeper to reserve enough UTXOs; the keeper picks them, marks them taken,
//! and hands back a [`Reservation`] that must later be cancelled (rollback),
//! expire, or be superseded by the confirmed spend removing the UTXOs.
//!
//! ## Coin Selection
//!
//! Candidates are sorted by amount, largest first. The selection grows from
//! the largest UTXO until it covers the target, then repeatedly tries to
//! drop its largest member in favour of a short run of the next smaller
//! UTXOs, keeping the total at or above the target with at most
//! [`DESIRE_UTXO_COUNT`] inputs. The result spends fewer large coins than
//! a greedy pick and avoids sweeping up dust.
//!
//! ## Locking
//!
//! All reservation state sits behind one mutex. The confirmed UTXO scan
//! reads the store before taking it, so store I/O never blocks cancels or
//! the expiry sweep.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::store::{AccountStore, StoreError};
use super::Utxo;
use crate::chain::Chain;
use crate::config::DESIRE_UTXO_COUNT;
use crate::transaction::{AssetId, Hash};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("insufficient funds: need {needed}, have {available}")]
    Insufficient { needed: u64, available: u64 },

    #[error("funds are reserved by another build")]
    Reserved,

    #[error("funds are not yet mature")]
    Immature,

    #[error("funds are locked by a vote")]
    VoteLocked,

    #[error("can't find utxo {0}")]
    MatchUtxo(Hash),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Requests and Results
// ---------------------------------------------------------------------------

/// Whose UTXOs a reservation may draw from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Account(String),
    Address(String),
}

impl Owner {
    fn owns(&self, utxo: &Utxo) -> bool {
        match self {
            Owner::Account(id) => utxo.account_id == *id,
            Owner::Address(addr) => utxo.address == *addr,
        }
    }
}

/// Parameters of [`UtxoKeeper::reserve`].
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub owner: Owner,
    pub asset_id: AssetId,
    pub amount: u64,
    pub use_unconfirmed: bool,
    /// Only UTXOs carrying exactly this vote qualify. `None` matches only
    /// vote-free UTXOs.
    pub vote: Option<Vec<u8>>,
    /// Run selection as if nothing were reserved and record nothing.
    pub ignore_reserved: bool,
    pub expires_at: DateTime<Utc>,
}

impl ReserveRequest {
    pub fn new(owner: Owner, asset_id: AssetId, amount: u64, expires_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            asset_id,
            amount,
            use_unconfirmed: false,
            vote: None,
            ignore_reserved: false,
            expires_at,
        }
    }

    pub fn use_unconfirmed(mut self, yes: bool) -> Self {
        self.use_unconfirmed = yes;
        self
    }

    pub fn vote(mut self, vote: Option<Vec<u8>>) -> Self {
        self.vote = vote;
        self
    }

    pub fn ignore_reserved(mut self, yes: bool) -> Self {
        self.ignore_reserved = yes;
        self
    }

    fn has_vote(&self) -> bool {
        self.vote.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// A claim on a set of UTXOs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Zero for previews, which are never recorded.
    pub id: u64,
    pub utxos: Vec<Utxo>,
    pub change: u64,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of coin selection over a candidate pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub utxos: Vec<Utxo>,
    /// Sum of the selected amounts.
    pub opt_amount: u64,
    /// Sum of the candidates skipped because they are already reserved.
    pub reserved_amount: u64,
}

/// `None` and an empty vote are the same thing.
fn same_vote(a: &Option<Vec<u8>>, b: &Option<Vec<u8>>) -> bool {
    a.as_deref().unwrap_or(&[]) == b.as_deref().unwrap_or(&[])
}

/// Pick UTXOs from `pool` covering `target`.
///
/// Pure function of its inputs; `is_reserved` decides which candidates are
/// off limits.
pub fn select_utxos(
    mut pool: Vec<Utxo>,
    target: u64,
    is_reserved: impl Fn(&Hash) -> bool,
) -> Selection {
    pool.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.output_id.cmp(&b.output_id))
    });

    let mut reserved_amount = 0u64;
    let mut avail = Vec::with_capacity(pool.len());
    for utxo in pool {
        if is_reserved(&utxo.output_id) {
            reserved_amount = reserved_amount.saturating_add(utxo.amount);
        } else {
            avail.push(utxo);
        }
    }

    let mut selected: Vec<Utxo> = Vec::new();
    let mut opt = 0u64;
    let mut i = 0;
    while i < avail.len() {
        if opt < target {
            opt = opt.saturating_add(avail[i].amount);
            selected.push(avail[i].clone());
            i += 1;
            continue;
        }

        if selected.is_empty() {
            break;
        }

        // Try swapping the largest selected UTXO for a run of smaller ones.
        let mut replace_amount = opt - selected[0].amount;
        let mut run = 0;
        let mut j = i;
        let mut replaced = false;
        while j < avail.len() && run + selected.len() <= DESIRE_UTXO_COUNT {
            run += 1;
            replace_amount = replace_amount.saturating_add(avail[j].amount);
            if replace_amount >= target {
                selected.remove(0);
                selected.extend(avail[i..=j].iter().cloned());
                opt = replace_amount;
                i = j + 1;
                replaced = true;
                break;
            }
            j += 1;
        }

        if !replaced {
            break;
        }
    }

    Selection {
        utxos: selected,
        opt_amount: opt,
        reserved_amount,
    }
}

// ---------------------------------------------------------------------------
// UtxoKeeper
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct KeeperState {
    unconfirmed: HashMap<Hash, Utxo>,
    /// Output id to the reservation holding it.
    reserved: HashMap<Hash, u64>,
    reservations: HashMap<u64, Reservation>,
}

impl KeeperState {
    fn record(&mut self, reservation: &Reservation) {
        for utxo in &reservation.utxos {
            self.reserved.insert(utxo.output_id, reservation.id);
        }
        self.reservations.insert(reservation.id, reservation.clone());
    }

    fn release(&mut self, id: u64) -> bool {
        let Some(reservation) = self.reservations.remove(&id) else {
            return false;
        };
        for utxo in &reservation.utxos {
            if self.reserved.get(&utxo.output_id) == Some(&id) {
                self.reserved.remove(&utxo.output_id);
            }
        }
        true
    }
}

pub struct UtxoKeeper {
    next_index: AtomicU64,
    store: Arc<dyn AccountStore>,
    chain: Arc<dyn Chain>,
    state: Mutex<KeeperState>,
}

impl std::fmt::Debug for UtxoKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UtxoKeeper")
            .field("next_index", &self.next_index.load(Ordering::SeqCst))
            .field("unconfirmed", &state.unconfirmed.len())
            .field("reservations", &state.reservations.len())
            .finish()
    }
}

impl UtxoKeeper {
    pub fn new(store: Arc<dyn AccountStore>, chain: Arc<dyn Chain>) -> Self {
        Self {
            next_index: AtomicU64::new(0),
            store,
            chain,
            state: Mutex::new(KeeperState::default()),
        }
    }

    // -- unconfirmed pool ---------------------------------------------------

    /// Track outputs of transactions not yet in a block. Existing entries
    /// are left untouched.
    pub fn add_unconfirmed_utxo(&self, utxos: &[Utxo]) {
        let mut state = self.state.lock();
        for utxo in utxos {
            state
                .unconfirmed
                .entry(utxo.output_id)
                .or_insert_with(|| utxo.clone());
        }
    }

    pub fn remove_unconfirmed_utxo(&self, output_ids: &[Hash]) {
        let mut state = self.state.lock();
        for id in output_ids {
            state.unconfirmed.remove(id);
        }
    }

    pub fn list_unconfirmed(&self, account_id: &str) -> Vec<Utxo> {
        let state = self.state.lock();
        let mut out: Vec<Utxo> = state
            .unconfirmed
            .values()
            .filter(|u| u.account_id == account_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.output_id.cmp(&b.output_id));
        out
    }

    // -- reservations -------------------------------------------------------

    /// Reserve UTXOs covering `req.amount`.
    ///
    /// On shortfall the error says why: not enough funds at all, funds not
    /// yet mature (or vote-locked when reserving voted funds), or enough
    /// funds that are held by other reservations.
    pub fn reserve(&self, req: &ReserveRequest) -> Result<Reservation, KeeperError> {
        let confirmed = self.store.list_utxos()?;
        let height = self.chain.best_block_height();

        let mut state = self.state.lock();
        let (candidates, immature_amount) =
            Self::candidates(&state, confirmed, req, height);

        let selection = if req.ignore_reserved {
            select_utxos(candidates, req.amount, |_| false)
        } else {
            select_utxos(candidates, req.amount, |id| state.reserved.contains_key(id))
        };

        let Selection {
            utxos,
            opt_amount,
            reserved_amount,
        } = selection;

        let spendable = opt_amount.saturating_add(reserved_amount);
        if spendable.saturating_add(immature_amount) < req.amount {
            return Err(KeeperError::Insufficient {
                needed: req.amount,
                available: spendable.saturating_add(immature_amount),
            });
        }
        if spendable < req.amount {
            return Err(if req.has_vote() {
                KeeperError::VoteLocked
            } else {
                KeeperError::Immature
            });
        }
        if opt_amount < req.amount {
            return Err(KeeperError::Reserved);
        }

        let change = opt_amount - req.amount;
        if req.ignore_reserved {
            return Ok(Reservation {
                id: 0,
                utxos,
                change,
                expires_at: req.expires_at,
            });
        }

        let reservation = Reservation {
            id: self.next_index.fetch_add(1, Ordering::SeqCst) + 1,
            utxos,
            change,
            expires_at: req.expires_at,
        };
        state.record(&reservation);
        debug!(
            reservation = reservation.id,
            utxos = reservation.utxos.len(),
            amount = req.amount,
            change,
            "reserved utxos"
        );
        Ok(reservation)
    }

    /// Reserve one specific output, with no change.
    pub fn reserve_particular(
        &self,
        output_id: &Hash,
        use_unconfirmed: bool,
        expires_at: DateTime<Utc>,
    ) -> Result<Reservation, KeeperError> {
        let stored = self.find_stored(output_id)?;
        let height = self.chain.best_block_height();

        let mut state = self.state.lock();
        if state.reserved.contains_key(output_id) {
            return Err(KeeperError::Reserved);
        }

        let utxo = use_unconfirmed
            .then(|| state.unconfirmed.get(output_id).cloned())
            .flatten()
            .or(stored)
            .ok_or(KeeperError::MatchUtxo(*output_id))?;

        if utxo.valid_height > height {
            return Err(KeeperError::Immature);
        }

        let reservation = Reservation {
            id: self.next_index.fetch_add(1, Ordering::SeqCst) + 1,
            utxos: vec![utxo],
            change: 0,
            expires_at,
        };
        state.record(&reservation);
        debug!(reservation = reservation.id, %output_id, "reserved particular utxo");
        Ok(reservation)
    }

    /// Release a reservation. Unknown ids are ignored.
    pub fn cancel(&self, id: u64) -> bool {
        let released = self.state.lock().release(id);
        if released {
            debug!(reservation = id, "reservation cancelled");
        }
        released
    }

    /// Cancel every reservation that expired before `now`. Returns how many
    /// were released.
    pub fn expire_reservations(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<u64> = state
            .reservations
            .values()
            .filter(|r| r.expires_at < now)
            .map(|r| r.id)
            .collect();
        for id in &expired {
            state.release(*id);
        }
        expired.len()
    }

    /// Spawn the periodic expiry sweep.
    pub fn spawn_expire_worker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let keeper = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));
        info!(?period, "starting reservation expiry worker");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = keeper.expire_reservations(Utc::now());
                if expired > 0 {
                    debug!(expired, "expired reservations");
                }
            }
        })
    }

    // -- queries --------------------------------------------------------------

    pub fn reservation(&self, id: u64) -> Option<Reservation> {
        self.state.lock().reservations.get(&id).cloned()
    }

    pub fn is_reserved(&self, output_id: &Hash) -> bool {
        self.state.lock().reserved.contains_key(output_id)
    }

    pub fn reservation_count(&self) -> usize {
        self.state.lock().reservations.len()
    }

    /// Look up a single UTXO: the unconfirmed pool (when allowed), then the
    /// standard store, then the contract store.
    pub fn find_utxo(&self, output_id: &Hash, use_unconfirmed: bool) -> Result<Utxo, KeeperError> {
        if use_unconfirmed {
            if let Some(u) = self.state.lock().unconfirmed.get(output_id) {
                return Ok(u.clone());
            }
        }
        self.find_stored(output_id)?
            .ok_or(KeeperError::MatchUtxo(*output_id))
    }

    /// Spendable UTXOs of `owner` in `asset_id` carrying `vote`, and the
    /// total held back as immature.
    pub fn find_utxos(
        &self,
        owner: &Owner,
        asset_id: AssetId,
        use_unconfirmed: bool,
        vote: Option<Vec<u8>>,
    ) -> Result<(Vec<Utxo>, u64), KeeperError> {
        let confirmed = self.store.list_utxos()?;
        let height = self.chain.best_block_height();
        let req = ReserveRequest::new(owner.clone(), asset_id, 0, Utc::now())
            .use_unconfirmed(use_unconfirmed)
            .vote(vote);
        let state = self.state.lock();
        Ok(Self::candidates(&state, confirmed, &req, height))
    }

    fn find_stored(&self, output_id: &Hash) -> Result<Option<Utxo>, KeeperError> {
        if let Some(u) = self.store.get_standard_utxo(output_id)? {
            return Ok(Some(u));
        }
        Ok(self.store.get_contract_utxo(output_id)?)
    }

    /// Filter confirmed (plus unconfirmed, if asked) UTXOs down to the
    /// request's owner, asset and vote. Immature matches are summed, not
    /// returned. A UTXO present in both sets counts once.
    fn candidates(
        state: &KeeperState,
        confirmed: Vec<Utxo>,
        req: &ReserveRequest,
        height: u64,
    ) -> (Vec<Utxo>, u64) {
        let seen: HashSet<Hash> = confirmed.iter().map(|u| u.output_id).collect();
        let unconfirmed = state
            .unconfirmed
            .values()
            .filter(|u| req.use_unconfirmed && !seen.contains(&u.output_id))
            .cloned();

        let mut immature = 0u64;
        let mut out = Vec::new();
        for utxo in confirmed.into_iter().chain(unconfirmed) {
            if !req.owner.owns(&utxo)
                || utxo.asset_id != req.asset_id
                || !same_vote(&utxo.vote, &req.vote)
            {
                continue;
            }
            if utxo.valid_height > height {
                immature = immature.saturating_add(utxo.amount);
                continue;
            }
            out.push(utxo);
        }
        (out, immature)
    }
}
