use std::io::Write;
use std::process::{Command, Stdio};

fn run(source: &str) -> (i32, String, String) {
    let mut path = std::env::temp_dir();
    path.push(format!("lulz-scenario-{}.lol", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(source.as_bytes()).unwrap();
    }
    let output = Command::new(env!("CARGO_BIN_EXE_interp"))
        .arg(&path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run interp");
    std::fs::remove_file(&path).ok();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn arithmetic() {
    let (code, stdout, _) = run("HAI 1.3\nVISIBLE SUM OF 2 AN 3\nKTHXBYE");
    assert_eq!(code, 0);
    assert_eq!(stdout, "5\n");
}

#[test]
fn mixed_numeric_widening() {
    let (code, stdout, _) = run("HAI 1.3\nVISIBLE SUM OF 1 AN 2.5\nKTHXBYE");
    assert_eq!(code, 0);
    assert_eq!(stdout, "3.5\n");
}

#[test]
fn globals_and_conditionals() {
    let source = "HAI 1.3\nI HAS A X ITZ 10\nBOTH SAEM X AN 10\nO RLY?\n YA RLY\n  VISIBLE \"yes\"\n NO WAI\n  VISIBLE \"no\"\nOIC\nKTHXBYE";
    let (code, stdout, _) = run(source);
    assert_eq!(code, 0);
    assert_eq!(stdout, "yes\n");
}

#[test]
fn recursive_fibonacci() {
    let source = "HAI 1.3\n\
HOW IZ I FIB YR N\n\
 BOTH SAEM N AN 0\n\
 O RLY?\n\
  YA RLY\n\
   FOUND YR 0\n\
  NO WAI\n\
   BOTH SAEM N AN 1\n\
   O RLY?\n\
    YA RLY\n\
     FOUND YR 1\n\
    NO WAI\n\
     FOUND YR SUM OF I IZ FIB YR DIFF OF N AN 1 MKAY AN I IZ FIB YR DIFF OF N AN 2 MKAY\n\
   OIC\n\
 OIC\n\
IF U SAY SO\n\
VISIBLE I IZ FIB YR 10 MKAY\n\
KTHXBYE";
    let (code, stdout, stderr) = run(source);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert_eq!(stdout, "55\n");
}

#[test]
fn visible_without_newline() {
    let (code, stdout, _) = run("HAI 1.3\nVISIBLE \"a\"!\nVISIBLE \"b\"\nKTHXBYE");
    assert_eq!(code, 0);
    assert_eq!(stdout, "ab\n");
}

#[test]
fn undefined_variable_is_a_compile_error() {
    let (code, _, stderr) = run("HAI 1.3\nVISIBLE Y\nKTHXBYE");
    assert_eq!(code, 65);
    assert!(stderr.contains("undefined variable Y"), "stderr: {stderr}");
}
