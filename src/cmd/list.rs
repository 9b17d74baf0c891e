//! Armory listing (`raidengine list`).

use anyhow::Result;

use raidengine::armory::filesystem_armory;

pub fn cmd_list() -> Result<()> {
    let armory = filesystem_armory();

    println!();
    println!("{:<12} Strikes", "Tactic");
    println!("{:<12} -------", "------");
    for name in armory.tactic_names() {
        let strikes: Vec<&str> = armory
            .strikes(&name)
            .unwrap_or_default()
            .iter()
            .map(|s| s.name())
            .collect();
        println!("{:<12} {}", name, strikes.join(", "));
    }
    println!();
    Ok(())
}
