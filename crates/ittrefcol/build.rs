//! Builds the C half of the variadic entry points (`csrc/`).

fn main() {
    cc::Build::new()
        .file("csrc/formatted_metadata.c")
        .compile("ittrefcol_variadic");
    println!("cargo:rerun-if-changed=csrc/formatted_metadata.c");
}
