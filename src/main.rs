use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use query_recorder::backend::reformat_date;
use query_recorder::csv;
use query_recorder::{
    Backend, ColumnKind, CsvBackend, EncryptedFileBackend, FileBackend, RawFields, RecordStore,
    Schema, SessionState, StoreConfig, StoreError,
};

const USAGE: &str = "\
query-recorder <command> [options]

Commands:
  list                     show all records (--csv for CSV output)
  add [--<column> value]   add one record
  update <index> [--<column> value]
                           replace fields of the record at <index>
  delete <index>...        remove one or more records
  import <file.csv>        bulk-load records from a CSV file
  export <file.csv>        write all records to a CSV file

Column flags are derived from the schema, e.g. --date, --client, --am,
--sf-ticket, --use-case, --notes, --code, --report-id.

Options:
  --store <path>       rows file for the JSON backend (default records.json)
  --log <path>         append-only log of added records (JSON backend only)
  --csv-store <path>   persist through a CSV file instead
  --encrypted <path>   persist through a password-protected file
  --password <pw>      password for --encrypted
  --compact            use the 6-column schema (no ticket/report columns)
  --sort-date-desc     show newest records first
";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

struct CliOptions {
    store_path: PathBuf,
    log_path: Option<PathBuf>,
    csv_path: Option<PathBuf>,
    encrypted_path: Option<PathBuf>,
    password: Option<String>,
    compact: bool,
    sort_date_desc: bool,
    list_as_csv: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("records.json"),
            log_path: None,
            csv_path: None,
            encrypted_path: None,
            password: None,
            compact: false,
            sort_date_desc: false,
            list_as_csv: false,
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut options = CliOptions::default();
    let mut command: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut field_flags: Vec<(String, String)> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--store" => options.store_path = PathBuf::from(take_value(&mut iter, "--store")?),
            "--log" => options.log_path = Some(PathBuf::from(take_value(&mut iter, "--log")?)),
            "--csv-store" => {
                options.csv_path = Some(PathBuf::from(take_value(&mut iter, "--csv-store")?))
            }
            "--encrypted" => {
                options.encrypted_path = Some(PathBuf::from(take_value(&mut iter, "--encrypted")?))
            }
            "--password" => options.password = Some(take_value(&mut iter, "--password")?),
            "--compact" => options.compact = true,
            "--sort-date-desc" => options.sort_date_desc = true,
            "--csv" => options.list_as_csv = true,
            "--help" | "-h" => {
                print!("{USAGE}");
                return Ok(());
            }
            other if other.starts_with("--") => {
                let value = take_value(&mut iter, other)?;
                field_flags.push((other.to_string(), value));
            }
            other => {
                if command.is_none() {
                    command = Some(other.to_string());
                } else {
                    positionals.push(other.to_string());
                }
            }
        }
    }

    let Some(command) = command else {
        print!("{USAGE}");
        return Err("no command given".to_string());
    };

    let schema = if options.compact {
        Schema::compact()
    } else {
        Schema::standard()
    };
    let backend = select_backend(&options)?;
    let config = StoreConfig {
        sort_by_date_descending: options.sort_date_desc,
    };
    let mut store =
        RecordStore::open(schema.clone(), backend, config).map_err(|err| err.to_string())?;

    match command.as_str() {
        "list" => {
            if options.list_as_csv {
                println!("{}", csv::rows_to_csv(&schema, store.list()));
            } else {
                print_records(&schema, &store);
            }
            Ok(())
        }
        "add" => {
            let mut state = SessionState::new(&schema);
            apply_field_flags(&schema, &mut state, &field_flags)?;
            store
                .add(&state.raw_fields())
                .map_err(|err| err.to_string())?;
            println!("added record {}", store.len() - 1);
            Ok(())
        }
        "update" => {
            let index = parse_index(positionals.first(), "update")?;
            let mut state = SessionState::new(&schema);
            if let Some(record) = store.list().get(index) {
                state.begin_edit(index, record);
            }
            apply_field_flags(&schema, &mut state, &field_flags)?;
            store
                .update(index, &state.raw_fields())
                .map_err(|err| err.to_string())?;
            println!("updated record {index}");
            Ok(())
        }
        "delete" => {
            if positionals.is_empty() {
                return Err("delete needs at least one index".to_string());
            }
            let mut indexes = BTreeSet::new();
            for value in &positionals {
                indexes.insert(parse_index(Some(value), "delete")?);
            }
            let removed = indexes.len();
            store.delete(&indexes).map_err(|err| err.to_string())?;
            println!("deleted {removed} record(s), {} remain", store.len());
            Ok(())
        }
        "import" => {
            let path = positionals
                .first()
                .ok_or_else(|| "import needs a CSV file path".to_string())?;
            let count = import_csv(&schema, &mut store, path.as_str())?;
            println!("imported {count} record(s)");
            Ok(())
        }
        "export" => {
            let path = positionals
                .first()
                .ok_or_else(|| "export needs a destination path".to_string())?;
            let content = csv::rows_to_export_csv(&schema, store.list());
            fs::write(path, content).map_err(|err| err.to_string())?;
            println!("exported {} record(s) to {path}", store.len());
            Ok(())
        }
        other => Err(format!("unknown command `{other}`")),
    }
}

fn select_backend(options: &CliOptions) -> Result<Box<dyn Backend>, String> {
    if let Some(path) = options.encrypted_path.as_ref() {
        let password = options
            .password
            .as_deref()
            .ok_or_else(|| "--encrypted requires --password".to_string())?;
        return Ok(Box::new(EncryptedFileBackend::new(path.clone(), password)));
    }
    if let Some(path) = options.csv_path.as_ref() {
        return Ok(Box::new(CsvBackend::new(path.clone())));
    }
    let backend = match options.log_path.as_ref() {
        Some(log_path) => FileBackend::with_log(options.store_path.clone(), log_path.clone()),
        None => FileBackend::new(options.store_path.clone()),
    };
    Ok(Box::new(backend))
}

fn take_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    iter.next().ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_index(value: Option<&String>, command: &str) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("{command} needs a record index"))?;
    value
        .parse::<usize>()
        .map_err(|_| format!("`{value}` is not a record index"))
}

/// CLI flag for a column name: `SF Ticket` becomes `--sf-ticket`.
fn column_flag(name: &str) -> String {
    format!("--{}", name.to_lowercase().replace(' ', "-"))
}

fn apply_field_flags(
    schema: &Schema,
    state: &mut SessionState,
    field_flags: &[(String, String)],
) -> Result<(), String> {
    for (flag, value) in field_flags {
        let position = schema
            .columns()
            .iter()
            .position(|column| column_flag(column.name.as_str()) == *flag)
            .ok_or_else(|| format!("unknown flag `{flag}`"))?;
        state.set_field(position, value.as_str());
    }
    Ok(())
}

fn print_records(schema: &Schema, store: &RecordStore) {
    if store.is_empty() {
        println!("no records");
        return;
    }
    for (index, record) in store.list().iter().enumerate() {
        let client = record.get(schema, "Client").unwrap_or("");
        let am = record.get(schema, "AM").unwrap_or("");
        println!("{index} - {client}/{am}");
        for (column, value) in schema.columns().iter().zip(record.values()) {
            if value.is_empty() {
                continue;
            }
            let mut lines = value.lines();
            if let Some(first) = lines.next() {
                println!("    {}: {first}", column.name);
            }
            for continuation in lines {
                println!("        {continuation}");
            }
        }
    }
}

fn import_csv(schema: &Schema, store: &mut RecordStore, path: &str) -> Result<usize, String> {
    let raw = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let parsed = csv::parse_csv(raw.as_str());
    let Some((header, data_rows)) = parsed.split_first() else {
        return Ok(0);
    };
    let expected = schema.header();
    if header != expected.as_slice() {
        return Err(StoreError::HeaderMismatch {
            expected,
            found: header.clone(),
        }
        .to_string());
    }
    let mut rows = Vec::with_capacity(data_rows.len());
    for row in data_rows {
        if row.len() != schema.len() {
            return Err(StoreError::FieldCount {
                expected: schema.len(),
                found: row.len(),
            }
            .to_string());
        }
        let values = row
            .iter()
            .zip(schema.columns())
            .map(|(value, column)| match column.kind {
                ColumnKind::Date => reformat_date(value.as_str()),
                _ => value.clone(),
            })
            .collect();
        rows.push(RawFields::new(values));
    }
    store
        .bulk_load(rows.as_slice())
        .map_err(|err| err.to_string())
}
