//! Built-in language table.

use super::LanguageSpec;

/// Managed-runtime and script-engine languages with slow host start-up.
const SLOW_START_TIMEOUT_SECONDS: u64 = 60;

pub(super) fn languages() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec::new("c", "gcc:13", "c", "./program")
            .with_compile("gcc -O2 -o program program.c -lm"),
        LanguageSpec::new("cpp", "gcc:13", "cpp", "./program")
            .with_compile("g++ -O2 -std=c++17 -o program program.cpp"),
        LanguageSpec::new("java", "eclipse-temurin:21-jdk", "java", "java Main")
            .with_source_file("Main.java")
            .with_compile("javac Main.java")
            .with_timeout_seconds(SLOW_START_TIMEOUT_SECONDS),
        LanguageSpec::new("python", "python:3.12-slim", "py", "python3 program.py"),
        LanguageSpec::new("kotlin", "zenika/kotlin:1.9", "kt", "java -jar program.jar")
            .with_compile("kotlinc program.kt -include-runtime -d program.jar"),
        LanguageSpec::new(
            "scala",
            "sbtscala/scala-sbt:eclipse-temurin-17.0.4_1.7.1_3.2.0",
            "scala",
            "scala Main",
        )
        .with_source_file("Main.scala")
        .with_compile("scalac Main.scala"),
        LanguageSpec::new("javascript", "node:20-slim", "js", "node program.js")
            .with_timeout_seconds(SLOW_START_TIMEOUT_SECONDS),
        LanguageSpec::new("go", "golang:1.22", "go", "./program")
            .with_compile("go build -o program program.go"),
        LanguageSpec::new("ruby", "ruby:3.3-slim", "rb", "ruby program.rb"),
        LanguageSpec::new("rust", "rust:1.77-slim", "rs", "./program")
            .with_compile("rustc -O -o program program.rs"),
        LanguageSpec::new("csharp", "mono:6.12", "cs", "mono program.exe")
            .with_compile("mcs -out:program.exe program.cs"),
    ]
}
