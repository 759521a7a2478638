fn main() {
    cloudscape::run();
}
