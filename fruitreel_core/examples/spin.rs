use fruitreel_core::{replay_spin, theoretical_rtp_for, SlotConfig};

fn main() {
    // Example end-to-end spin on the default machine
    let config = SlotConfig::default_fruit();
    let seed = 7u64;
    let outcome = replay_spin(&config, 10, seed).expect("valid bet");
    let reels: Vec<&str> = outcome.outcome.symbols().iter().map(|s| s.as_str()).collect();
    println!(
        "seed={} reels={} payout={} theoretical_rtp={:.3}%",
        seed,
        reels.join(" "),
        outcome.payout,
        theoretical_rtp_for(&config)
    );
}
