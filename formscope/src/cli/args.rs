//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "formscope",
    about = "Inspect compiled units: size, field and instruction counts, referenced units",
    after_help = "\
EXAMPLES:
    formscope target/classes                     Scan a directory recursively
    formscope app/core$handler.class             Inspect a single unit
    formscope target/classes --export units.json Write a JSON snapshot"
)]
pub struct Args {
    /// Compiled unit files or directories to scan for .class files
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Export snapshot to file (JSON)
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Print each unit's referenced units
    #[arg(short, long)]
    pub references: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_required() {
        assert!(Args::try_parse_from(["formscope"]).is_err());
    }

    #[test]
    fn test_parse_all_options() {
        let args =
            Args::try_parse_from(["formscope", "a", "b", "--export", "out.json", "-r", "-q"])
                .unwrap();
        assert_eq!(args.paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(args.export, Some(PathBuf::from("out.json")));
        assert!(args.references);
        assert!(args.quiet);
    }
}
