use kportal::run;

fn main() {
    let result = run();

    // Default error handling prints the error in detailed format.
    if let Err(error) = result {
        eprintln!("kportal process failed: {:?}", error);
        std::process::exit(1);
    }
}
