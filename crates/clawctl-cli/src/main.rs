fn main() -> std::process::ExitCode {
    clawctl::main_entry()
}
