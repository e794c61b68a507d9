use clap::{Arg, Command};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a deterministic contacts CSV to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("dup_every")
                .long("dup-every")
                .help("Repeat the previous email every N rows (0 = never)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("bad_age_every")
                .long("bad-age-every")
                .help("Write a non-numeric age every N rows (0 = never)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("bad_email_every")
                .long("bad-email-every")
                .help("Write an email without '@' every N rows (0 = never)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap();
    let dup_every: u64 = *matches.get_one("dup_every").unwrap();
    let bad_age_every: u64 = *matches.get_one("bad_age_every").unwrap();
    let bad_email_every: u64 = *matches.get_one("bad_email_every").unwrap();
    let hits = |every: u64, i: u64| every > 0 && i > 0 && i % every == 0;

    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(&mut out, "Email,Full Name,Age")?;

    for i in 0..rows {
        let email_id = if hits(dup_every, i) { i - 1 } else { i };
        if hits(bad_email_every, i) {
            write!(&mut out, "user{email_id:08}.example.com")?;
        } else {
            write!(&mut out, "user{email_id:08}@example.com")?;
        }
        write!(&mut out, ",\"User {i}, Jr\"")?;
        if hits(bad_age_every, i) {
            writeln!(&mut out, ",unknown")?;
        } else {
            writeln!(&mut out, ",{}", 18 + i % 60)?;
        }
        if i % 10_000 == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(())
}
