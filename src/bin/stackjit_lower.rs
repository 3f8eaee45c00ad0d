//! Lower one method's bytecode and print the requested stage.
//!
//! # Usage
//!
//! ```bash
//! # iconst_1 iconst_2 iadd ireturn
//! echo "04 05 60 ac" | stackjit-lower --hex --descriptor "()I" --static
//!
//! # with constant pool entries
//! stackjit-lower code.bin --descriptor "(I)V" --static --max-locals 1 \
//!     --constant "3=method:Main.log:(I)V" --constant "4=string:hello" --stage hir
//! ```

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use stackjit::{CompilationSession, ConstantTable, MethodCompiler, MethodInfo, PoolEntry};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackjit-lower")]
#[command(about = "Lower stack-machine bytecode to register LIR", long_about = None)]
struct Cli {
    /// Code file; stdin when omitted
    input: Option<PathBuf>,

    /// Input is hex text instead of raw bytes
    #[arg(long)]
    hex: bool,

    /// Method descriptor
    #[arg(short, long, default_value = "()V")]
    descriptor: String,

    /// Static method (no receiver in local 0)
    #[arg(long = "static")]
    is_static: bool,

    /// Local variable slots, including parameters
    #[arg(long, default_value = "0")]
    max_locals: u16,

    /// Declaring class
    #[arg(long, default_value = "Main")]
    owner: String,

    /// Method name
    #[arg(long, default_value = "method")]
    name: String,

    /// Label prefix; defaults to owner and name
    #[arg(long)]
    label_prefix: Option<String>,

    /// Constant pool entry: INDEX=int:N, INDEX=string:TEXT, INDEX=class:NAME,
    /// INDEX=field:OWNER.NAME:DESC or INDEX=method:OWNER.NAME:DESC
    #[arg(short, long = "constant", value_parser = parse_constant)]
    constants: Vec<(u16, PoolEntry)>,

    /// Stage to print
    #[arg(short, long, value_enum, default_value = "lir")]
    stage: Stage,

    /// Print session statistics
    #[arg(long)]
    stats: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Stage {
    Blocks,
    Hir,
    Lir,
}

fn parse_constant(text: &str) -> Result<(u16, PoolEntry), String> {
    let (index, entry) = text.split_once('=').ok_or("expected INDEX=KIND:VALUE")?;
    let index: u16 = index.trim().parse().map_err(|e| format!("bad index {:?}: {}", index, e))?;
    let (kind, value) = entry.split_once(':').ok_or("expected KIND:VALUE")?;

    let member = |value: &str| -> Result<(String, String, String), String> {
        let (path, descriptor) = value.split_once(':').ok_or("expected OWNER.NAME:DESC")?;
        let (owner, name) = path.rsplit_once('.').ok_or("expected OWNER.NAME")?;
        Ok((owner.to_string(), name.to_string(), descriptor.to_string()))
    };

    let entry = match kind {
        "int" => PoolEntry::Integer(value.parse().map_err(|e| format!("bad int {:?}: {}", value, e))?),
        "string" => PoolEntry::String(value.to_string()),
        "class" => PoolEntry::Class(value.to_string()),
        "field" => {
            let (owner, name, descriptor) = member(value)?;
            PoolEntry::Field { owner, name, descriptor }
        }
        "method" => {
            let (owner, name, descriptor) = member(value)?;
            PoolEntry::Method { owner, name, descriptor }
        }
        other => return Err(format!("unknown constant kind {:?}", other)),
    };
    Ok((index, entry))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).map_err(|e| format!("bad hex byte {:?}: {}", byte, e))
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let raw = match &cli.input {
        Some(path) => fs::read(path)?,
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };
    let code = if cli.hex { parse_hex(&String::from_utf8(raw)?)? } else { raw };

    let mut pool = ConstantTable::new();
    for (index, entry) in &cli.constants {
        pool.insert(*index, entry.clone());
    }

    let method = MethodInfo {
        owner: &cli.owner,
        name: &cli.name,
        descriptor: &cli.descriptor,
        is_static: cli.is_static,
        max_locals: cli.max_locals,
        code: &code,
    };

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiler = MethodCompiler::new(&session, &pool);
    let prefix = cli.label_prefix.clone().unwrap_or_else(|| method.label_prefix());

    let compiled = match compiler.compile_with_prefix(&method, &prefix) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut out = String::new();
    match cli.stage {
        Stage::Blocks => compiled.write_blocks(&mut out)?,
        Stage::Hir => compiled.write_hir(&mut out)?,
        Stage::Lir => out = compiled.to_string(),
    }
    print!("{}", out);

    if cli.stats {
        eprintln!("{}", session.stats());
    }
    Ok(())
}
