use std::env;
use std::path::Path;
use std::process::ExitCode;

use macho2::binary_image::Arch;

fn parse_arch(s: &str) -> Option<Arch> {
    match s {
        "auto" => Some(Arch::Auto),
        "arm64" => Some(Arch::Aarch64),
        "arm" => Some(Arch::Arm),
        "x86_64" => Some(Arch::X86_64),
        "x86" => Some(Arch::X86),
        _ => None,
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut file_path = None;
    let mut arch = Arch::Auto;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--arch" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("--arch requires a value (auto|arm64|arm|x86_64|x86)");
                    return ExitCode::FAILURE;
                };
                let Some(parsed) = parse_arch(value) else {
                    eprintln!("unrecognised --arch value: {}", value);
                    return ExitCode::FAILURE;
                };
                arch = parsed;
            }
            path if file_path.is_none() => file_path = Some(path.to_string()),
            unexpected => {
                eprintln!("unexpected argument: {}", unexpected);
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let Some(file_path) = file_path else {
        eprintln!("Usage: {} [--arch auto|arm64|arm|x86_64|x86] <file_path>", args[0]);
        return ExitCode::FAILURE;
    };

    let Some(catalog) = macho2::parse(Path::new(&file_path), arch) else {
        eprintln!("failed to load or select an architecture in {}", file_path);
        return ExitCode::FAILURE;
    };

    for protocol in catalog.protocols() {
        println!("@protocol {}", protocol.mangled_name);
        for method in &protocol.required_methods {
            println!("  {}", prototype_string(method));
        }
        for method in &protocol.optional_methods {
            println!("  (optional) {}", prototype_string(method));
        }
        println!();
    }

    for class in catalog.classes() {
        println!("@interface {} : {}", class.name, superclass_name(class));
        for ivar in &class.ivars {
            println!("  {{ {} {} }}", ivar.mangled_type, ivar.name);
        }
        for property in &class.properties {
            println!("  @property {} ({})", property.name, property.attribute);
        }
        for method in &class.methods {
            println!("  {}", prototype_string(method));
        }
        println!();
    }

    ExitCode::SUCCESS
}

fn superclass_name(class: &macho2::catalog::Class) -> String {
    class
        .superclass
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "<root>".to_string())
}

fn prototype_string(method: &macho2::catalog::Method) -> String {
    let sigil = if method.is_instance { "-" } else { "+" };
    match method.prototype() {
        Some((ret, params)) => {
            let params = params.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
            format!("{} ({}) {} ({})", sigil, ret, method.name, params)
        }
        None => format!("{} {} /* unparsed: {} */", sigil, method.name, method.mangled_type),
    }
}
