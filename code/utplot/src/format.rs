/// Generic formatting code for a set of data extracted from a data structure to be presented
/// columnar, as csv, as awk-friendly text, or as json, and (except for json and awk) with or without
/// a header and with or without named fields.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    if let Some(ref s) = fmt {
        if s.starts_with("help") {
            let mut help = f();
            println!("Syntax:\n  --fmt=(field|alias|control),...");
            println!("\nFields:");
            help.fields.sort();
            for f in help.fields {
                println!("  {f}");
            }
            if !help.aliases.is_empty() {
                println!("\nAliases:");
                help.aliases.sort();
                for (name, mut fields) in help.aliases {
                    fields.sort();
                    let explication = fields.join(",");
                    println!("  {name} --> {explication}");
                }
            }
            println!("\nDefaults:\n  {}", help.defaults);
            println!("\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  noheader\n  tag:<tagvalue>");
            return true;
        }
    }
    false
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, DataT, FmtT, CtxT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(aliases) = aliases.get(x) {
            for alias in aliases {
                if formatters.contains_key(alias) {
                    fields.push(alias.as_ref());
                } else {
                    others.insert(alias.as_ref());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv or csvnamed explicitly requested
    pub awk: bool,    // awk explicitly requested
    pub fixed: bool,  // fixed output explicitly requested
    pub named: bool,  // csvnamed explicitly requested
    pub header: bool, // true if nothing requested b/c fixed+header is default
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csvnamed = others.contains("csvnamed");
    let csv = others.contains("csv") || csvnamed;
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    let fixed = others.contains("fixed") && !csv && !json && !awk;
    // json and awk get no header, even if one is requested
    let header = (!csv && !json && !awk && !others.contains("noheader"))
        || (csv && others.contains("header"));
    let mut tag: Option<String> = None;
    for x in others {
        if let Some(t) = x.strip_prefix("tag:") {
            tag = Some(t.to_string());
            break;
        }
    }
    FormatOptions {
        csv,
        json,
        awk,
        header,
        tag,
        fixed,
        named: csvnamed,
    }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names as a
/// header (independent of csv).  Set `opts.csv` to true to get CSV output instead of fixed-format.
/// Set `opts.tag` to Some(s) to print a tag=s field in the output.

pub fn format_data<DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: Vec<DataT>,
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    // Look the formatters up once, not once per datum.
    let mut fmts = vec![];
    for kwd in fields {
        match formatters.get(*kwd) {
            Some(f) => fmts.push(f),
            None => bail!("Unknown field {kwd}"),
        }
    }

    let mut cols = vec![Vec::<String>::new(); fields.len()];
    for x in &data {
        for (i, f) in fmts.iter().enumerate() {
            cols[i].push(f(x, ctx));
        }
    }

    if opts.csv {
        format_csv(output, fields, opts, cols)
    } else if opts.json {
        format_json(output, fields, opts, cols)
    } else if opts.awk {
        format_awk(output, fields, opts, cols)
    } else {
        format_fixed_width(output, fields, opts, cols);
        Ok(())
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) {
    // The column width is the max across all the entries in the column (including header,
    // if present).  If there's a tag, it is printed in the last column.
    let mut widths = vec![0; fields.len() + if opts.tag.is_some() { 1 } else { 0 }];
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);

    if opts.header {
        for (i, kwd) in fields.iter().enumerate() {
            widths[i] = usize::max(widths[i], kwd.len());
        }
        if opts.tag.is_some() {
            widths[fields.len()] = usize::max(widths[fields.len()], "tag".len());
        }
    }

    for row in 0..nrows {
        for col in 0..fields.len() {
            widths[col] = usize::max(widths[col], cols[col][row].len());
        }
        if let Some(ref tag) = opts.tag {
            widths[fields.len()] = usize::max(widths[fields.len()], tag.len());
        }
    }

    // Header
    if opts.header {
        let mut s = "".to_string();
        for (i, kwd) in fields.iter().enumerate() {
            let w = widths[i];
            s += format!("{:w$}  ", kwd).as_str();
        }
        if opts.tag.is_some() {
            let w = widths[fields.len()];
            s += format!("{:w$}  ", "tag").as_str();
        }
        // Ignore errors here, they are common for broken pipelines
        let _ = output.write(s.trim_end().as_bytes());
        let _ = output.write(b"\n");
    }

    // Body
    for row in 0..nrows {
        let mut s = "".to_string();
        for col in 0..fields.len() {
            let w = widths[col];
            s += format!("{:w$}  ", cols[col][row]).as_str();
        }
        if let Some(ref tag) = opts.tag {
            let w = widths[fields.len()];
            s += format!("{:w$}  ", tag).as_str();
        }
        // Ignore errors here, they are common for broken pipelines
        let _ = output.write(s.trim_end().as_bytes());
        let _ = output.write(b"\n");
    }
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);

    if opts.header {
        let mut out_fields = fields.iter().map(|f| f.to_string()).collect::<Vec<String>>();
        if opts.tag.is_some() {
            out_fields.push("tag".to_string());
        }
        writer.write_record(out_fields)?;
    }

    for row in 0..nrows {
        let mut out_fields = Vec::new();
        for col in 0..fields.len() {
            let val = &cols[col][row];
            if opts.named {
                out_fields.push(format!("{}={}", fields[col], val));
            } else {
                out_fields.push(val.to_string());
            }
        }
        if let Some(ref tag) = opts.tag {
            if opts.named {
                out_fields.push(format!("tag={tag}"));
            } else {
                out_fields.push(tag.clone());
            }
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);
    let mut objects = vec![];
    for row in 0..nrows {
        let mut obj = json::JsonValue::new_object();
        for col in 0..fields.len() {
            obj[fields[col]] = cols[col][row].clone().into();
        }
        if let Some(ref tag) = opts.tag {
            obj["tag"] = tag.to_string().into();
        }
        objects.push(obj);
    }
    output.write_all(json::stringify(objects).as_bytes())?;
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they
// are replaced by `_`.

fn format_awk(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);
    for row in 0..nrows {
        let mut line = "".to_string();
        for col in 0..fields.len() {
            if !line.is_empty() {
                line += " ";
            }
            line += cols[col][row].replace(' ', "_").as_str();
        }
        if let Some(ref tag) = opts.tag {
            if !line.is_empty() {
                line += " ";
            }
            line += tag;
        }
        line += "\n";
        output.write_all(line.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
type TestDatum<'a> = &'a (&'static str, usize);

#[cfg(test)]
fn format_test_name(d: TestDatum, _: ()) -> String {
    d.0.to_string()
}

#[cfg(test)]
fn format_test_n(d: TestDatum, _: ()) -> String {
    d.1.to_string()
}

#[cfg(test)]
fn test_formatters() -> (
    HashMap<String, &'static dyn Fn(TestDatum, ()) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(TestDatum, ()) -> String> =
        HashMap::new();
    formatters.insert("name".to_string(), &format_test_name);
    formatters.insert("n".to_string(), &format_test_n);
    let mut aliases = HashMap::new();
    aliases.insert("all".to_string(), vec!["name".to_string(), "n".to_string()]);
    (formatters, aliases)
}

#[cfg(test)]
fn format_to_string(spec: &str) -> String {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(
        &mut out,
        &fields,
        &formatters,
        &opts,
        vec![("a b", 10), ("c", 2)],
        (),
    )
    .unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_format_fixed() {
    assert!(format_to_string("all") == "name  n\na b   10\nc     2\n");
    assert!(format_to_string("n,noheader") == "10\n2\n");
}

#[test]
fn test_format_csv_and_awk() {
    assert!(format_to_string("all,csv") == "a b,10\nc,2\n");
    assert!(format_to_string("all,csvnamed") == "name=a b,n=10\nname=c,n=2\n");
    assert!(format_to_string("all,csv,header,tag:x") == "name,n,tag\na b,10,x\nc,2,x\n");
    assert!(format_to_string("all,awk") == "a_b 10\nc 2\n");
}

#[test]
fn test_format_json() {
    let s = format_to_string("all,json");
    let v = json::parse(&s).unwrap();
    assert!(v.len() == 2);
    assert!(v[0]["name"] == "a b");
    assert!(v[1]["n"] == "2");
}

#[test]
fn test_no_fields() {
    let (formatters, aliases) = test_formatters();
    assert!(parse_fields("csv,header", &formatters, &aliases).is_err());
}
