use crate::cmd::{load_config, open_accounts, pick_user, runtime};
use crate::output::{or_dash, print_json, print_table};
use seatkeeper_core::booking::BookingOrchestrator;
use seatkeeper_core::clock::Clock;
use seatkeeper_core::types::{Reservation, Seat, VenueId};
use seatkeeper_core::window;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Open a session for one account and run `f` against it.
fn with_account<T, F, Fut>(home: &Path, user: Option<&str>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<BookingOrchestrator>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let config = load_config(home)?;
    let user = pick_user(&config, user)?;
    let mut scoped = config;
    scoped.accounts.retain(|a| a.user == user);

    let rt = runtime()?;
    rt.block_on(async move {
        let accounts = open_accounts(&scoped)?;
        let account = accounts.get(&user)?;
        let result = f(account).await;
        accounts.shutdown_all();
        result
    })
}

fn status_name(seat: &Seat) -> String {
    serde_json::to_value(seat.status())
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn describe(r: &Reservation) -> String {
    let seat = r.seat_name.as_deref().unwrap_or(&r.seat_key);
    format!("seat {seat} in venue {} ({})", r.venue_id, r.state())
}

// ---------------------------------------------------------------------------
// venues
// ---------------------------------------------------------------------------

pub fn venues(home: &Path, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    with_account(home, user, |account| async move {
        let venues = account.list_venues().await?;
        if json {
            return print_json(&venues);
        }
        if venues.is_empty() {
            println!("No venues.");
            return Ok(());
        }
        let now = account.clock().time_of_day();
        let rows = venues
            .iter()
            .map(|v| {
                let hours = match (&v.open_time, &v.close_time) {
                    (Some(o), Some(c)) => format!("{o}-{c}"),
                    _ => "always".to_string(),
                };
                vec![
                    v.id.to_string(),
                    v.name.clone(),
                    hours,
                    if window::is_open(v, now) { "yes" } else { "no" }.to_string(),
                ]
            })
            .collect();
        print_table(&["ID", "NAME", "HOURS", "OPEN"], rows);
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// layout
// ---------------------------------------------------------------------------

pub fn layout(home: &Path, user: Option<&str>, venue_id: VenueId, json: bool) -> anyhow::Result<()> {
    with_account(home, user, |account| async move {
        account.list_venues().await?;
        let layout = account.layout(venue_id).await?;
        if let Err(e) = account.refresh_reservation().await {
            tracing::warn!(kind = ?e.kind, "could not refresh reservation: {e}");
        }

        let mut seats = Vec::new();
        for seat in layout.seats() {
            let bookable = account.can_book(venue_id, &seat.key).await;
            let mine = account.is_mine(venue_id, &seat.key).await;
            seats.push((seat.clone(), bookable, mine));
        }

        if json {
            let value: Vec<_> = seats
                .iter()
                .map(|(s, bookable, mine)| {
                    serde_json::json!({
                        "key": s.key,
                        "name": s.name,
                        "status": s.status(),
                        "bookable": bookable,
                        "mine": mine,
                    })
                })
                .collect();
            return print_json(&serde_json::json!({ "venueId": venue_id, "seats": value }));
        }
        if seats.is_empty() {
            println!("No seat data for venue {venue_id}.");
            return Ok(());
        }
        let rows = seats
            .into_iter()
            .map(|(s, bookable, mine)| {
                vec![
                    s.key.clone(),
                    s.name.clone(),
                    status_name(&s),
                    if bookable { "yes" } else { "" }.to_string(),
                    if mine { "*" } else { "" }.to_string(),
                ]
            })
            .collect();
        print_table(&["KEY", "NAME", "STATUS", "BOOKABLE", "MINE"], rows);
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// reservation
// ---------------------------------------------------------------------------

pub fn reservation(home: &Path, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    with_account(home, user, |account| async move {
        let current = account.refresh_reservation().await?;
        if json {
            return print_json(&current);
        }
        match current {
            Some(r) => println!("{}", describe(&r)),
            None => println!("No active reservation."),
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// book / cancel / signin
// ---------------------------------------------------------------------------

pub fn book(
    home: &Path,
    user: Option<&str>,
    venue_id: VenueId,
    seat_key: &str,
    json: bool,
) -> anyhow::Result<()> {
    let seat_key = seat_key.to_string();
    with_account(home, user, |account| async move {
        let result = account.book(venue_id, &seat_key).await?;
        if json {
            return print_json(&result);
        }
        println!(
            "Reserved seat {} in venue {}{}",
            result.seat_name,
            result.venue_id,
            if result.confirmed_by_refresh {
                " (confirmed after a conflict report)"
            } else {
                ""
            }
        );
        Ok(())
    })
}

pub fn cancel(home: &Path, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    with_account(home, user, |account| async move {
        account.cancel().await?;
        if json {
            return print_json(&serde_json::json!({ "cancelled": true }));
        }
        println!("Reservation cancelled.");
        Ok(())
    })
}

pub fn sign_in(home: &Path, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    with_account(home, user, |account| async move {
        account.refresh_reservation().await?;
        let message = account.sign_in().await?;
        if json {
            return print_json(&serde_json::json!({ "message": message }));
        }
        println!("Signed in: {message}");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// frequent
// ---------------------------------------------------------------------------

pub fn frequent(home: &Path, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    with_account(home, user, |account| async move {
        let seats = account.frequent_seats().await?;
        if json {
            return print_json(&seats);
        }
        if seats.is_empty() {
            println!("No frequent seats.");
            return Ok(());
        }
        let rows = seats
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                vec![
                    (i + 1).to_string(),
                    s.venue_id.to_string(),
                    s.seat_key,
                    or_dash(Some(s.label).filter(|l| !l.is_empty())),
                ]
            })
            .collect();
        print_table(&["#", "VENUE", "SEAT", "LABEL"], rows);
        Ok(())
    })
}
