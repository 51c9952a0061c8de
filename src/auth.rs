use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "IAMAGES_LOCK_PASSWORD";
pub const NEW_PASSWORD_ENV: &str = "IAMAGES_LOCK_NEW_PASSWORD";

fn from_env(var: &str) -> Option<Zeroizing<String>> {
    std::env::var(var)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn read_line() -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut buf)?;
    trim_newline(&mut buf);
    Ok(buf)
}

/// Password of a locked image.
///
/// Sources in order: `IAMAGES_LOCK_PASSWORD`, one line of piped stdin, a TTY
/// prompt.
pub fn read_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(PASSWORD_ENV) {
        return Ok(pw);
    }

    if !io::stdin().is_terminal() {
        let pw = read_line()?;
        if !pw.is_empty() {
            return Ok(pw);
        }
    } else {
        let pw = Zeroizing::new(rpassword::prompt_password("Lock password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("No password provided")
}

/// A new lock password, confirmed.
///
/// Sources in order: `IAMAGES_LOCK_NEW_PASSWORD`, two lines of piped stdin,
/// two TTY prompts.
pub fn read_new_password_with_confirmation() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(NEW_PASSWORD_ENV) {
        return Ok(pw);
    }

    let (pw1, pw2) = if !io::stdin().is_terminal() {
        (read_line()?, read_line()?)
    } else {
        (
            Zeroizing::new(rpassword::prompt_password("New lock password: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm lock password: ")?),
        )
    };

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
