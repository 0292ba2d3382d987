//! Lead numbers and the outbound dial side effect.
//!
//! The [`LeadSource`] trait is the seam between the dialer and whatever
//! produces candidate numbers. Production would back it with a CRM lead
//! feed; here [`RandomLeadSource`] generates synthetic numbers conforming to
//! the 10-digit North American Numbering Plan.

use rand::Rng;
use tracing::info;

/// Produces candidate phone numbers on demand.
pub trait LeadSource: Send + Sync {
    /// One candidate number in human-readable form, e.g. `(212) 555-0100`.
    fn next_number(&self) -> String;
}

/// Uniform random NANP numbers.
#[derive(Debug, Default)]
pub struct RandomLeadSource;

impl LeadSource for RandomLeadSource {
    fn next_number(&self) -> String {
        generate_lead_number()
    }
}

/// Place the outbound call for `agent_id`.
///
/// Fire and forget. In a real deployment this hands the number to the
/// telephony stack; connect, fail and hangup outcomes come back later as
/// events on the owning [`PowerDialer`](crate::dialer::PowerDialer).
pub fn dial(agent_id: &str, number: &str) {
    info!("Dialing {} for {}", number, agent_id);
}

/// Return a phone number (mostly) conforming to the 10-digit North American
/// Numbering Plan, formatted `(NPA) NXX-XXXX` for readability.
pub fn generate_lead_number() -> String {
    let mut rng = rand::thread_rng();
    let npa = generate_npa(&mut rng);
    let coc = generate_central_office_code(&mut rng);
    let line = generate_line_number(&mut rng);
    format!("({npa}) {coc}-{line}")
}

// 3-digit area code, first digit 2-9. The second digit stays below 9 to dodge
// the x9x block; easily recognizable codes are not filtered out.
fn generate_npa(rng: &mut impl Rng) -> String {
    let first = rng.gen_range(2..=9);
    let second = rng.gen_range(0..=8);
    let third = rng.gen_range(0..=9);
    format!("{first}{second}{third}")
}

// 3-digit central office code: first digit 2-9, last two digits never `11`
// (those are service codes like 211 and 911).
fn generate_central_office_code(rng: &mut impl Rng) -> String {
    let first = rng.gen_range(2..=9);
    let second = rng.gen_range(0..=9);
    let mut third = rng.gen_range(0..=9);
    while second == 1 && third == 1 {
        third = rng.gen_range(0..=9);
    }
    format!("{first}{second}{third}")
}

fn generate_line_number(rng: &mut impl Rng) -> String {
    let number: u16 = rng.gen_range(0..=9999);
    format!("{number:04}")
}
