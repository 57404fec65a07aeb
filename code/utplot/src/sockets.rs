/// Socket ranking report: every socket that logged delay samples, with its sample count, most active
/// first.
use crate::format;
use crate::SocketsPrintArgs;

use anyhow::Result;
use std::collections::HashMap;
use std::io;
use utplog::{Record, SocketCount};

pub fn print_sockets(
    output: &mut dyn io::Write,
    print_args: &SocketsPrintArgs,
    records: &[Record],
) -> Result<()> {
    let mut ranking = utplog::rank_sockets(records);
    if let Some(n) = print_args.top {
        ranking.truncate(n);
    }

    let (formatters, aliases) = my_formatters();
    let spec = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, ranking, ())
}

/// The ranking reported by an automatic socket selection, in the default format.

pub fn print_ranking(output: &mut dyn io::Write, ranking: &[SocketCount]) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let (fields, others) = format::parse_fields(FMT_DEFAULTS, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, ranking.to_vec(), ())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters
            .keys()
            .cloned()
            .collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "socket,count";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(SocketDatum, SocketCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(SocketDatum, SocketCtx) -> String> =
        HashMap::new();
    let aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("socket".to_string(), &format_socket);
    formatters.insert("count".to_string(), &format_count);
    (formatters, aliases)
}

type SocketDatum<'a> = &'a SocketCount;
type SocketCtx = ();

fn format_socket(d: SocketDatum, _: SocketCtx) -> String {
    d.socket.to_string()
}

fn format_count(d: SocketDatum, _: SocketCtx) -> String {
    d.count.to_string()
}

#[cfg(test)]
fn records_of(text: &str) -> Vec<Record> {
    utplog::parse_log(io::Cursor::new(text.as_bytes())).unwrap().0
}

#[cfg(test)]
const SOME_SOCKETS: &str = "[1] b: our_delay:1\n\
                            [2] a: our_delay:1\n\
                            [3] a: our_delay:2\n\
                            [4] c: rtt:4\n\
                            [5] b: our_delay:3\n\
                            [6] d: our_delay:3\n";

#[test]
fn test_print_sockets() {
    let records = records_of(SOME_SOCKETS);
    let mut out = Vec::new();
    print_sockets(&mut out, &SocketsPrintArgs::default(), &records).unwrap();
    assert!(String::from_utf8(out).unwrap() == "socket  count\nb       2\na       2\nd       1\n");

    let args = SocketsPrintArgs {
        top: Some(1),
        fmt: Some("socket,csv".to_string()),
    };
    let mut out = Vec::new();
    print_sockets(&mut out, &args, &records).unwrap();
    assert!(String::from_utf8(out).unwrap() == "b\n");
}

#[test]
fn test_print_ranking() {
    let ranking = vec![SocketCount {
        socket: "0x1".into(),
        count: 10,
    }];
    let mut out = Vec::new();
    print_ranking(&mut out, &ranking).unwrap();
    assert!(String::from_utf8(out).unwrap() == "socket  count\n0x1     10\n");
}
