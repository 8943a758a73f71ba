//! Parameter listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use sonant_synth::{Param, ParamRate};

use super::common::format_value;

#[derive(Args)]
pub struct ParamsArgs {
    /// Only list parameters in this group (e.g., "Filter")
    #[arg(long)]
    group: Option<String>,
}

pub fn run(args: ParamsArgs) -> anyhow::Result<()> {
    let params: Vec<Param> = Param::ALL
        .into_iter()
        .filter(|p| {
            args.group
                .as_deref()
                .is_none_or(|g| p.descriptor().group.eq_ignore_ascii_case(g))
        })
        .collect();

    if params.is_empty() {
        anyhow::bail!(
            "No parameters in group '{}'",
            args.group.as_deref().unwrap_or_default()
        );
    }

    println!("Parameters");
    println!("==========");
    println!();
    println!(
        "  {:4}  {:20}  {:14}  {:12}  {:24}  {}",
        "ID", "Name", "Group", "Default", "Range", "Rate"
    );
    println!(
        "  {:4}  {:20}  {:14}  {:12}  {:24}  {}",
        "--", "----", "-----", "-------", "-----", "----"
    );

    for param in params {
        let d = param.descriptor();
        let range = match d.choice_count() {
            Some(count) => format!("{count} choices"),
            None => format!("{} .. {}", format_value(param, d.min), format_value(param, d.max)),
        };
        let rate = match param.rate() {
            ParamRate::Audio => "audio",
            ParamRate::Block => "block",
        };
        println!(
            "  {:4}  {:20}  {:14}  {:12}  {:24}  {}",
            param.id(),
            d.string_id,
            d.group,
            format_value(param, d.default),
            range,
            rate
        );
    }

    Ok(())
}
