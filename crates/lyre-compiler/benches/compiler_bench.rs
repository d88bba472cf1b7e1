use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lyre_compiler::compiler::compile;

fn bench_compile_simple(c: &mut Criterion) {
    let src = "local x = 42\nprint x + 1\n";
    c.bench_function("compile_simple", |b| {
        b.iter(|| compile(black_box(src)).unwrap());
    });
}

fn bench_compile_fibonacci(c: &mut Criterion) {
    let src = r#"
function fib(n)
    if n <= 1 then
        return n
    end
    return fib(n - 1) + fib(n - 2)
end
print fib(10)
"#;
    c.bench_function("compile_fibonacci", |b| {
        b.iter(|| compile(black_box(src)).unwrap());
    });
}

fn bench_compile_sieve(c: &mut Criterion) {
    let src = r#"
function sieve(n)
    local flags = {}
    for i = 2 to n do
        flags[i] = true
    end
    for i = 2 to n do
        if flags[i] then
            for j = i * i to n step i do
                flags[j] = false
            end
        end
    end
    local count = 0
    for i = 2 to n do
        if flags[i] then
            count += 1
        end
    end
    return count
end
print sieve(100)
"#;
    c.bench_function("compile_sieve", |b| {
        b.iter(|| compile(black_box(src)).unwrap());
    });
}

fn bench_compile_many_locals(c: &mut Criterion) {
    let mut src = String::new();
    for i in 0..200 {
        src.push_str(&format!("local x{i} = {i}\n"));
    }
    src.push_str("print x0\n");
    c.bench_function("compile_200_locals", |b| {
        b.iter(|| compile(black_box(&src)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_compile_simple,
    bench_compile_fibonacci,
    bench_compile_sieve,
    bench_compile_many_locals
);
criterion_main!(benches);
