use std::io::{self, BufRead, Write};

use crate::{account::Account, error::InputError};

pub fn parse_count(field: &'static str, raw: &str) -> Result<usize, InputError> {
    match raw.trim().parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(InputError::NotPositive {
            field,
            raw: raw.trim().to_string(),
        }),
    }
}

/// Uses `given` when it validates; otherwise asks on the terminal until an answer does.
pub fn resolve<T>(
    given: Option<String>,
    prompt: &str,
    read: impl Fn(&str) -> io::Result<String>,
    parse: impl Fn(&str) -> Result<T, InputError>,
) -> io::Result<T> {
    if let Some(raw) = given {
        match parse(&raw) {
            Ok(value) => return Ok(value),
            Err(err) => eprintln!("{err}"),
        }
    }
    loop {
        let raw = read(prompt)?;
        match parse(&raw) {
            Ok(value) => return Ok(value),
            Err(err) => eprintln!("{err}"),
        }
    }
}

pub fn read_line(prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(line)
}

pub fn read_secret(prompt: &str) -> io::Result<String> {
    rpassword::prompt_password(prompt)
}

pub struct OperatorInput {
    pub operator: Account,
    pub accounts: usize,
    pub workers: usize,
}

pub fn collect(
    private_key: Option<String>,
    accounts: Option<String>,
    workers: Option<String>,
) -> io::Result<OperatorInput> {
    let operator = resolve(private_key, "operator private key: ", read_secret, Account::from_hex)?;
    let accounts = resolve(accounts, "accounts to generate: ", read_line, |raw| {
        parse_count("account count", raw)
    })?;
    let workers = resolve(workers, "worker pool size: ", read_line, |raw| {
        parse_count("worker count", raw)
    })?;
    Ok(OperatorInput {
        operator,
        accounts,
        workers,
    })
}
