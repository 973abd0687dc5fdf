use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("warpwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: warpwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("WARPWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "atom: type={} max_size={}",
        String::from_utf8_lossy(&warpwire_frame::ATOM_TYPE),
        warpwire_frame::MAX_ATOM_SIZE
    );
    println!(
        "features: session={}, mem={}, cli=true",
        cfg!(feature = "session"),
        cfg!(feature = "mem")
    );

    Ok(SUCCESS)
}
