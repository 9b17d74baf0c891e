//! Results file viewer (`raidengine report <file>`).

use anyhow::Result;
use std::path::Path;

use raidengine::persist::load_tactic;
use raidengine::tactic::Tactic;

pub fn cmd_report(file: &Path) -> Result<()> {
    let tactic = load_tactic(file)?;
    print_tactic(&tactic);
    Ok(())
}

fn print_tactic(tactic: &Tactic) {
    let verdict = if tactic.bad_state_alert {
        console::style("BAD STATE").red().bold()
    } else if tactic.passed {
        console::style("PASSED").green().bold()
    } else {
        console::style("FAILED").yellow().bold()
    };

    println!();
    println!("Tactic: {} [{}]", console::style(&tactic.name).bold(), verdict);
    println!("Status: {}", tactic.status);
    if let (Some(start), Some(end)) = (tactic.start_time, tactic.end_time) {
        let elapsed = (end - start).num_milliseconds();
        println!("Ran:    {} ({} ms)", start.format("%Y-%m-%d %H:%M:%S UTC"), elapsed);
    }
    println!(
        "Strikes: {} attempted, {} passed, {} failed",
        tactic.attempts, tactic.successes, tactic.failures
    );
    println!();

    for (name, result) in &tactic.strike_results {
        let mark = if result.bad_state_alert {
            console::style("!!").red().bold()
        } else if result.passed {
            console::style("ok").green()
        } else {
            console::style("xx").yellow()
        };
        println!("  [{}] {}: {}", mark, name, result.description);
        if !result.control_id.is_empty() {
            println!("       control: {}", result.control_id);
        }
        println!("       {}", console::style(&result.message).dim());

        for (movement_name, movement) in &result.movements {
            let status = if movement.passed { "pass" } else { "fail" };
            println!("       - {} ({}): {}", movement_name, status, movement.message);
            for (change_name, change) in &movement.changes {
                let state = if change.bad_state() {
                    "bad state"
                } else if change.reverted() {
                    "reverted"
                } else if change.applied() {
                    "applied"
                } else {
                    "not applied"
                };
                println!("           change {}: {}", change_name, state);
            }
        }
    }
    println!();
}
