fn main() {
    #[cfg(windows)]
    {
        use std::path::PathBuf;

        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        let ico_path = PathBuf::from(&manifest_dir).join("resources").join("perch.ico");
        println!("cargo:rerun-if-changed={}", ico_path.display());

        // 아이콘이 없으면 리소스 없이 빌드
        if ico_path.exists() {
            let mut res = winres::WindowsResource::new();
            res.set_icon(&ico_path.to_string_lossy());
            res.set("FileDescription", "perch installer controller");

            if let Err(e) = res.compile() {
                println!("cargo:warning=Failed to compile resources: {}", e);
            }
        } else {
            println!("cargo:warning=Icon not found at {}, building without it", ico_path.display());
        }
    }
}
