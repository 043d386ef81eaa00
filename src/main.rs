pub fn main() -> iced::Result {
    brats_viewer::app::run()
}
