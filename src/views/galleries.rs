use maud::{html, Markup};
use url::form_urlencoded;

use crate::models::Gallery;

fn csrf_field(token: &str) -> Markup {
    html! { input type="hidden" name="csrf_token" value=(token); }
}

pub fn new(csrf: &str, title: &str) -> Markup {
    html! {
        div.row {
            div class="col-md-6 col-md-offset-3" {
                div.panel.panel-primary {
                    div.panel-heading {
                        h3.panel-title { "Create a gallery" }
                    }
                    div.panel-body {
                        form action="/galleries" method="POST" {
                            (csrf_field(csrf))
                            div.form-group {
                                label for="title" { "Title" }
                                input.form-control type="text" name="title" id="title"
                                    placeholder="What is the title of your gallery?" value=(title);
                            }
                            button.btn.btn-primary type="submit" { "Create" }
                        }
                    }
                }
            }
        }
    }
}

pub fn index(galleries: &[Gallery]) -> Markup {
    html! {
        div.row {
            div class="col-md-12" {
                table.table.table-hover {
                    thead {
                        tr {
                            th { "#" }
                            th { "Title" }
                            th { "View" }
                            th { "Edit" }
                        }
                    }
                    tbody {
                        @for g in galleries {
                            tr {
                                th scope="row" { (g.id) }
                                td { (g.title) }
                                td { a href={ "/galleries/" (g.id) } { "View" } }
                                td { a href={ "/galleries/" (g.id) "/edit" } { "Edit" } }
                            }
                        }
                    }
                }
                a.btn.btn-primary href="/galleries/new" { "New Gallery" }
            }
        }
    }
}

pub fn show(gallery: &Gallery) -> Markup {
    html! {
        div.row {
            div class="col-md-12" {
                h1 { (gallery.title) }
                hr;
            }
        }
        div.row {
            @for column in gallery.images_split_n(3) {
                div class="col-md-4" {
                    @for image in &column {
                        a href=(image.path()) {
                            img.thumbnail src=(image.path()) alt=(image.filename);
                        }
                    }
                }
            }
        }
    }
}

pub fn edit(csrf: &str, gallery: &Gallery) -> Markup {
    // Multipart bodies are not inspected for the token, so it rides in the query.
    let upload_query = form_urlencoded::Serializer::new(String::new())
        .append_pair("csrf_token", csrf)
        .finish();

    html! {
        div.row {
            div class="col-md-10 col-md-offset-1" {
                h2 { "Edit your gallery" }
                a href={ "/galleries/" (gallery.id) } { "View this gallery" }
                hr;
            }
            div class="col-md-10 col-md-offset-1" {
                form.form-horizontal action={ "/galleries/" (gallery.id) "/update" } method="POST" {
                    (csrf_field(csrf))
                    div.form-group {
                        label class="col-md-1 control-label" for="title" { "Title" }
                        div class="col-md-9" {
                            input.form-control type="text" name="title" id="title" value=(gallery.title);
                        }
                        div class="col-md-2" {
                            button.btn.btn-default type="submit" { "Save" }
                        }
                    }
                }
            }
            div class="col-md-10 col-md-offset-1" {
                h3 { "Images" }
                table.table {
                    @for image in &gallery.images {
                        tr {
                            td {
                                a href=(image.path()) {
                                    img.thumbnail src=(image.path()) alt=(image.filename) width="120";
                                }
                            }
                            td { (image.filename) }
                            td {
                                form action=(image.delete_path()) method="POST" {
                                    (csrf_field(csrf))
                                    button.btn.btn-default type="submit" { "Delete" }
                                }
                            }
                        }
                    }
                }
                form action={ "/galleries/" (gallery.id) "/images?" (upload_query) }
                    method="POST" enctype="multipart/form-data" {
                    div.form-group {
                        label for="images" { "Add images" }
                        input type="file" multiple name="images" id="images";
                        p.help-block { "Only jpg, jpeg, and png are supported." }
                    }
                    button.btn.btn-default type="submit" { "Upload" }
                }
            }
            div class="col-md-10 col-md-offset-1" {
                h3 { "Dangerous buttons..." }
                form action={ "/galleries/" (gallery.id) "/delete" } method="POST" {
                    (csrf_field(csrf))
                    button.btn.btn-danger type="submit" { "Delete" }
                }
            }
        }
    }
}
