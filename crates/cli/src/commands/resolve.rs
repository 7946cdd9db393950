use anyhow::Result;
use qemu_exec_core::arch::find_arch_suffixes;

/// Print the architecture candidates for a type descriptor.
pub fn resolve_command(descriptor: &str, json: bool) -> Result<()> {
    let suffixes = find_arch_suffixes(descriptor);
    if json {
        println!("{}", serde_json::to_string_pretty(&suffixes)?);
        return Ok(());
    }
    if suffixes.is_empty() {
        println!("No architecture candidates for: {descriptor}");
        return Ok(());
    }
    println!("Architecture candidates ({}):", suffixes.len());
    for suffix in suffixes {
        println!("  - {suffix}");
    }
    Ok(())
}
